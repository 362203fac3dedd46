//! Configurations for the pseudo device drivers.
//! The tables are generated at build time from `pcdevs.json` at the workspace root,
//! so the static registration source can change without touching driver code.
//!
//! Values here are raw: permissions and tuning tags are plain integers and are
//! validated by the consumer when the tables are loaded.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

/// One statically registered device: the name it is announced under and its
/// platform data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDeviceEntry {
    /// Announcement name, matched against the driver's id table.
    pub name: &'static str,
    /// Buffer size in bytes.
    pub size: u32,
    /// `1` read only, `2` write only, `3` read/write.
    pub permission: u32,
    /// Identity string exported as an attribute.
    pub serial_number: &'static str,
    /// Index into [TUNING_TABLE].
    pub tuning: u32,
}

/// Maps a descriptor `compatible` string to a tuning index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfMatchEntry {
    /// Compatible string declared by a descriptor node.
    pub compatible: &'static str,
    /// Index into [TUNING_TABLE].
    pub tuning: u32,
}

/// Per-family configuration items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningParams {
    /// Tag the entry is looked up by.
    pub tag: u32,
    /// First configuration item.
    pub configure_num1: i32,
    /// Second configuration item.
    pub configure_num2: i32,
}

mod build_table {
    #![allow(missing_docs)]
    use super::{OfMatchEntry, PlatformDeviceEntry, TuningParams};
    include!(concat!(env!("OUT_DIR"), "/build_table.rs"));
}

pub use build_table::*;
