//! Attribute export.
//!
//! Groups of named scalar attributes, each group backed by an
//! [AttributeSource]. Values are plain strings without the trailing newline a
//! host filesystem would append; stores are trimmed before parsing.

use crate::{
    error::{DeviceError, DeviceResult},
    instance::{InstanceId, InstanceTable},
};
use alloc::{
    boxed::Box,
    collections::btree_map::BTreeMap,
    format,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::fmt;
use log::info;
use spin::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDesc {
    pub name: &'static str,
    pub mode: AttrMode,
}

impl AttributeDesc {
    pub const fn ro(name: &'static str) -> AttributeDesc {
        AttributeDesc {
            name,
            mode: AttrMode::ReadOnly,
        }
    }

    pub const fn rw(name: &'static str) -> AttributeDesc {
        AttributeDesc {
            name,
            mode: AttrMode::ReadWrite,
        }
    }
}

/// Backing implementation of one attribute group.
///
/// Callers go through [AttributeRef], which has already checked that the
/// source is live, that `attr` exists and, for `store`, that it is writable.
pub trait AttributeSource: Send + Sync {
    /// Fails once the backing object is gone. Sources that cannot go away
    /// keep the default.
    fn check_live(&self) -> DeviceResult<()> {
        Ok(())
    }

    fn show(&self, attr: &str) -> DeviceResult<String>;
    fn store(&self, attr: &str, value: &str) -> DeviceResult<()>;
}

#[derive(Clone)]
struct AttributeGroup {
    attrs: &'static [AttributeDesc],
    source: Arc<dyn AttributeSource>,
}

/// Handle on an exported group. Stays usable after the group is unexported;
/// whether the backing object is still alive is up to the source.
#[derive(Clone)]
pub struct AttributeRef {
    node: Box<str>,
    group: AttributeGroup,
}

impl fmt::Debug for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeRef")
            .field("node", &self.node)
            .field("attrs", &self.group.attrs)
            .finish()
    }
}

impl AttributeRef {
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn attributes(&self) -> &'static [AttributeDesc] {
        self.group.attrs
    }

    fn desc(&self, attr: &str) -> DeviceResult<&'static AttributeDesc> {
        self.group
            .attrs
            .iter()
            .find(|desc| desc.name == attr)
            .ok_or(DeviceError::NoSuchAttribute)
    }

    pub fn show(&self, attr: &str) -> DeviceResult<String> {
        self.group.source.check_live()?;
        self.desc(attr)?;
        self.group.source.show(attr)
    }

    pub fn store(&self, attr: &str, value: &str) -> DeviceResult<()> {
        self.group.source.check_live()?;
        if self.desc(attr)?.mode != AttrMode::ReadWrite {
            return Err(DeviceError::PermissionDenied);
        }
        self.group.source.store(attr, value)
    }

    /// Store raw bytes as written by a host. Returns the number of bytes
    /// consumed, which is all of them on success.
    pub fn store_bytes(&self, attr: &str, buf: &[u8]) -> DeviceResult<usize> {
        let value = core::str::from_utf8(buf).map_err(|_| DeviceError::InvalidValue)?;
        self.store(attr, value)?;
        Ok(buf.len())
    }
}

/// Registry of exported attribute groups, keyed by node name.
#[derive(Default)]
pub struct AttributeExport {
    groups: RwLock<BTreeMap<Box<str>, AttributeGroup>>,
}

impl fmt::Debug for AttributeExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.groups.read().keys()).finish()
    }
}

impl AttributeExport {
    pub fn new() -> AttributeExport {
        AttributeExport::default()
    }

    pub fn export(
        &self,
        node: &str,
        attrs: &'static [AttributeDesc],
        source: Arc<dyn AttributeSource>,
    ) -> DeviceResult<()> {
        let mut guard = self.groups.write();
        if guard.contains_key(node) {
            return Err(DeviceError::AlreadyExists);
        }
        guard.insert(Box::from(node), AttributeGroup { attrs, source });
        Ok(())
    }

    pub fn unexport(&self, node: &str) -> bool {
        self.groups.write().remove(node).is_some()
    }

    pub fn lookup(&self, node: &str) -> DeviceResult<AttributeRef> {
        let group = self
            .groups
            .read()
            .get(node)
            .cloned()
            .ok_or(DeviceError::NotFound)?;
        Ok(AttributeRef {
            node: Box::from(node),
            group,
        })
    }

    pub fn nodes(&self) -> Vec<Box<str>> {
        self.groups.read().keys().cloned().collect()
    }
}

pub const ATTR_CAPACITY: &str = "capacity";
pub const ATTR_IDENTITY: &str = "identity";

/// Attribute set of a pseudo char device instance.
pub static PCDEV_ATTRS: [AttributeDesc; 2] =
    [AttributeDesc::rw(ATTR_CAPACITY), AttributeDesc::ro(ATTR_IDENTITY)];

/// Source for [PCDEV_ATTRS]. Resolves the instance by id on every call.
pub struct PcdevAttributes {
    id: InstanceId,
    table: Arc<InstanceTable>,
}

impl PcdevAttributes {
    pub fn new(id: InstanceId, table: Arc<InstanceTable>) -> PcdevAttributes {
        PcdevAttributes { id, table }
    }
}

impl AttributeSource for PcdevAttributes {
    fn check_live(&self) -> DeviceResult<()> {
        let instance = self.table.get(self.id)?;
        instance.lock_live()?;
        Ok(())
    }

    fn show(&self, attr: &str) -> DeviceResult<String> {
        let instance = self.table.get(self.id)?;
        let state = instance.lock_live()?;
        match attr {
            ATTR_CAPACITY => Ok(format!("{}", state.capacity())),
            ATTR_IDENTITY => Ok(state.config.identity.to_string()),
            _ => Err(DeviceError::NoSuchAttribute),
        }
    }

    fn store(&self, attr: &str, value: &str) -> DeviceResult<()> {
        if attr != ATTR_CAPACITY {
            return Err(DeviceError::PermissionDenied);
        }
        let capacity = value
            .trim()
            .parse::<usize>()
            .map_err(|_| DeviceError::InvalidValue)?;
        let instance = self.table.get(self.id)?;
        instance.resize(capacity)?;
        info!("Instance {}: capacity changed to {}.", self.id, capacity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instance::Instance,
        platform::{AccessPolicy, DeviceConfig},
    };

    fn setup() -> (Arc<InstanceTable>, AttributeExport, InstanceId) {
        let table = Arc::new(InstanceTable::new());
        let id = table.allocate_id();
        let config = DeviceConfig::new(512, AccessPolicy::ReadWrite, "PCDEVABC1111", None).unwrap();
        table.insert(Arc::new(Instance::new(id, "pcdev-0", config).unwrap()));
        let export = AttributeExport::new();
        export
            .export(
                "pcdev-0",
                &PCDEV_ATTRS,
                Arc::new(PcdevAttributes::new(id, table.clone())),
            )
            .unwrap();
        (table, export, id)
    }

    #[test]
    fn show_reports_capacity_and_identity() {
        let (_table, export, _id) = setup();
        let attrs = export.lookup("pcdev-0").unwrap();
        assert_eq!(attrs.show(ATTR_CAPACITY).unwrap(), "512");
        assert_eq!(attrs.show(ATTR_IDENTITY).unwrap(), "PCDEVABC1111");
        assert_eq!(attrs.show("max_size"), Err(DeviceError::NoSuchAttribute));
    }

    #[test]
    fn capacity_store_trims_and_resizes() {
        let (table, export, id) = setup();
        let attrs = export.lookup("pcdev-0").unwrap();
        assert_eq!(attrs.store_bytes(ATTR_CAPACITY, b"256\n"), Ok(4));
        assert_eq!(attrs.show(ATTR_CAPACITY).unwrap(), "256");
        assert_eq!(table.get(id).unwrap().lock_live().unwrap().buffer.len(), 256);
    }

    #[test]
    fn bad_capacity_values_leave_buffer_alone() {
        let (_table, export, _id) = setup();
        let attrs = export.lookup("pcdev-0").unwrap();
        for bad in ["0", "-4", "0x10", "", "12ab"] {
            assert_eq!(attrs.store(ATTR_CAPACITY, bad), Err(DeviceError::InvalidValue));
        }
        assert_eq!(
            attrs.store_bytes(ATTR_CAPACITY, &[0xff, 0xfe]),
            Err(DeviceError::InvalidValue)
        );
        assert_eq!(attrs.show(ATTR_CAPACITY).unwrap(), "512");
    }

    #[test]
    fn identity_is_read_only() {
        let (_table, export, _id) = setup();
        let attrs = export.lookup("pcdev-0").unwrap();
        assert_eq!(
            attrs.store(ATTR_IDENTITY, "other"),
            Err(DeviceError::PermissionDenied)
        );
    }

    #[test]
    fn reference_outliving_instance_is_stale() {
        let (table, export, id) = setup();
        let attrs = export.lookup("pcdev-0").unwrap();
        assert!(export.unexport("pcdev-0"));
        table.remove(id).unwrap().retire();
        assert_eq!(attrs.show(ATTR_CAPACITY), Err(DeviceError::StaleInstance));
        assert_eq!(attrs.store(ATTR_CAPACITY, "8"), Err(DeviceError::StaleInstance));
        // staleness wins over the read-only and unknown-name checks
        assert_eq!(attrs.store(ATTR_IDENTITY, "other"), Err(DeviceError::StaleInstance));
        assert_eq!(attrs.show("max_size"), Err(DeviceError::StaleInstance));
        assert_eq!(export.lookup("pcdev-0").err(), Some(DeviceError::NotFound));
    }

    #[test]
    fn duplicate_groups_are_rejected() {
        let (table, export, id) = setup();
        let again = export.export(
            "pcdev-0",
            &PCDEV_ATTRS,
            Arc::new(PcdevAttributes::new(id, table)),
        );
        assert_eq!(again, Err(DeviceError::AlreadyExists));
        assert_eq!(export.nodes().len(), 1);
    }
}
