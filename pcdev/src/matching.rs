//! Matching engine: resolves an announcement to a [DeviceConfig].
//!
//! Two configuration sources are consulted, first match wins:
//! 1. a descriptor node, when one accompanies the announcement. Its
//!    `compatible` list is looked up in the compatibility table to find the
//!    tuning tag. A node that lacks a required property is rejected outright
//!    and never falls through to the static table.
//! 2. the static id table, by announced name.
//!
//! The engine only returns configuration; binding is left to the lifecycle
//! manager so matching can be exercised in isolation.

use crate::{
    error::{DeviceError, DeviceResult},
    platform::{AccessPolicy, DeviceConfig},
};
use alloc::{string::String, vec::Vec};
use dt::node::Node;
use log::warn;

/// Identity string of the device.
pub const PROP_SERIAL_NUMBER: &str = "org,device-serial-num";
/// Buffer size in bytes, one cell.
pub const PROP_SIZE: &str = "org,size";
/// Access policy, one cell, encoded as [AccessPolicy].
pub const PROP_PERMISSION: &str = "org,permission";

/// Entry of the static id table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticEntry {
    pub name: String,
    pub config: DeviceConfig,
}

/// Entry of the compatibility table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatEntry {
    pub compatible: String,
    pub tuning_tag: u32,
}

/// Which source produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Descriptor,
    StaticTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    pub config: DeviceConfig,
    pub source: MatchSource,
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    id_table: Vec<StaticEntry>,
    of_match_table: Vec<CompatEntry>,
}

impl Matcher {
    pub fn new(id_table: Vec<StaticEntry>, of_match_table: Vec<CompatEntry>) -> Matcher {
        Matcher {
            id_table,
            of_match_table,
        }
    }

    /// Tables generated from `pcdevs.json`. Static entries with an unknown
    /// permission or a zero size are skipped with a warning.
    pub fn from_platform() -> Matcher {
        let id_table = ::config::PLATFORM_DEVICES
            .iter()
            .filter_map(|dev| {
                let Ok(policy) = AccessPolicy::try_from(dev.permission) else {
                    warn!(
                        "Skipped static device '{}': unknown permission {}.",
                        dev.name, dev.permission
                    );
                    return None;
                };
                match DeviceConfig::new(
                    dev.size as usize,
                    policy,
                    dev.serial_number,
                    Some(dev.tuning),
                ) {
                    Ok(config) => Some(StaticEntry {
                        name: String::from(dev.name),
                        config,
                    }),
                    Err(err) => {
                        warn!("Skipped static device '{}': {}.", dev.name, err);
                        None
                    }
                }
            })
            .collect();
        let of_match_table = ::config::OF_MATCH_TABLE
            .iter()
            .map(|entry| CompatEntry {
                compatible: String::from(entry.compatible),
                tuning_tag: entry.tuning,
            })
            .collect();
        Matcher::new(id_table, of_match_table)
    }

    pub fn id_table(&self) -> &[StaticEntry] {
        &self.id_table
    }

    pub fn of_match_table(&self) -> &[CompatEntry] {
        &self.of_match_table
    }

    /// Whether `name` appears in the static id table.
    pub fn matches_name(&self, name: &str) -> bool {
        self.id_table.iter().any(|entry| entry.name == name)
    }

    /// Whether the node declares a compatible string of the compatibility table.
    pub fn matches_node(&self, node: &Node) -> bool {
        self.compat_tag(node).is_some()
    }

    /// Resolve an announcement.
    pub fn resolve(&self, name: &str, node: Option<&Node>) -> DeviceResult<Matched> {
        if let Some(node) = node {
            let config = self.parse_descriptor(node)?;
            return Ok(Matched {
                config,
                source: MatchSource::Descriptor,
            });
        }
        self.id_table
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| Matched {
                config: entry.config.clone(),
                source: MatchSource::StaticTable,
            })
            .ok_or(DeviceError::Unmatched)
    }

    /// Read the three required properties of a descriptor node.
    pub fn parse_descriptor(&self, node: &Node) -> DeviceResult<DeviceConfig> {
        let identity = node
            .require(PROP_SERIAL_NUMBER)
            .and_then(|prop| prop.value_as_str())
            .map_err(DeviceError::descriptor(PROP_SERIAL_NUMBER))?;
        let size = node
            .require(PROP_SIZE)
            .and_then(|prop| prop.value_as_u32())
            .map_err(DeviceError::descriptor(PROP_SIZE))?;
        let permission = node
            .require(PROP_PERMISSION)
            .and_then(|prop| prop.value_as_u32())
            .map_err(DeviceError::descriptor(PROP_PERMISSION))?;
        let policy = AccessPolicy::try_from(permission).map_err(|_| {
            DeviceError::MalformedDescriptor {
                property: PROP_PERMISSION,
            }
        })?;
        DeviceConfig::new(size as usize, policy, identity, self.compat_tag(node)).map_err(|_| {
            DeviceError::MalformedDescriptor {
                property: PROP_SIZE,
            }
        })
    }

    /// Tuning tag of the first compatible string found in the compatibility table.
    pub fn compat_tag(&self, node: &Node) -> Option<u32> {
        node.compatible().into_iter().find_map(|comp| {
            self.of_match_table
                .iter()
                .find(|entry| entry.compatible == comp)
                .map(|entry| entry.tuning_tag)
        })
    }
}
