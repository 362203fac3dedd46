//! Platform data: per-device configuration, the tuning table and runtime settings.

use crate::error::{DeviceError, DeviceResult};
use alloc::{collections::btree_map::BTreeMap, string::String};
use core::fmt::{self, Display};
use log::warn;
use num_enum::TryFromPrimitive;

/// Access policy of a device, encoded as in the platform data
/// (`1` read only, `2` write only, `3` read/write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum AccessPolicy {
    ReadOnly = 1,
    WriteOnly = 2,
    ReadWrite = 3,
}

impl Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessPolicy::ReadOnly => "RDONLY",
            AccessPolicy::WriteOnly => "WRONLY",
            AccessPolicy::ReadWrite => "RDWR",
        };
        f.write_str(name)
    }
}

/// Configuration a device instance is created from. Only `capacity` may change
/// after bind, through the capacity attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub capacity: usize,
    pub access_policy: AccessPolicy,
    pub identity: String,
    /// Raw tag into the [TuningTable]; `None` when the match source names none.
    pub tuning_tag: Option<u32>,
}

impl DeviceConfig {
    /// Build a config, rejecting a zero capacity.
    pub fn new(
        capacity: usize,
        access_policy: AccessPolicy,
        identity: impl Into<String>,
        tuning_tag: Option<u32>,
    ) -> DeviceResult<DeviceConfig> {
        if capacity == 0 {
            return Err(DeviceError::InvalidValue);
        }
        Ok(DeviceConfig {
            capacity,
            access_policy,
            identity: identity.into(),
            tuning_tag,
        })
    }
}

/// Device families known to the tuning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive)]
#[repr(u32)]
pub enum TuningTag {
    PcdevA = 0,
    PcdevB = 1,
    PcdevC = 2,
    PcdevD = 3,
}

/// Auxiliary per-family parameters. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningEntry {
    pub tag: TuningTag,
    pub param_a: i32,
    pub param_b: i32,
}

/// Read-only lookup table keyed by [TuningTag].
#[derive(Debug, Clone, Default)]
pub struct TuningTable {
    entries: BTreeMap<TuningTag, TuningEntry>,
}

impl TuningTable {
    pub fn new(entries: impl IntoIterator<Item = TuningEntry>) -> TuningTable {
        TuningTable {
            entries: entries.into_iter().map(|entry| (entry.tag, entry)).collect(),
        }
    }

    /// The table generated from `pcdevs.json`. Entries whose tag is not a
    /// known [TuningTag] are dropped with a warning.
    pub fn from_platform() -> TuningTable {
        let entries = ::config::TUNING_TABLE.iter().filter_map(|params| {
            match TuningTag::try_from(params.tag) {
                Ok(tag) => Some(TuningEntry {
                    tag,
                    param_a: params.configure_num1,
                    param_b: params.configure_num2,
                }),
                Err(_) => {
                    warn!("Skipped tuning entry with unknown tag {}.", params.tag);
                    None
                }
            }
        });
        TuningTable::new(entries)
    }

    /// Look up a raw tag. Out-of-range tags are rejected here instead of
    /// being trusted as an index.
    pub fn lookup(&self, raw: u32) -> Option<&TuningEntry> {
        let tag = TuningTag::try_from(raw).ok()?;
        self.entries.get(&tag)
    }
}

/// Runtime knobs of the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Maximum number of simultaneously live instances.
    pub max_instances: usize,
    /// Prefix of the node name each instance is exposed under.
    pub node_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_instances: ::config::NO_OF_DEVICES,
            node_prefix: String::from(::config::NODE_PREFIX),
        }
    }
}
