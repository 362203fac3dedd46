#![no_std]

pub mod endian;
