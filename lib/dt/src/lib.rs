//! Hierarchical hardware descriptors.
//!
//! A [node::DeviceTree] is a tree of [node::Node]s, each carrying named
//! [prop::Property] values encoded the way a flattened device tree encodes
//! them (big-endian cells, NUL-terminated strings). Descriptor sources build
//! trees through [node::DeviceTree::build_node]; drivers only read them.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod node;
pub mod prop;
