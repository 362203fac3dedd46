//! Platform bus: driver registration, announcements and descriptor discovery.
//!
//! Responsibilities:
//! - Provide the [Driver] trait, one implementation per device family.
//! - Route an announcement to the first registered driver that
//!   [matches](Driver::matches) it and remember the resulting binding under a
//!   [DeviceKey] until it is withdrawn.
//! - Walk a [DeviceTree] and announce every available node carrying a
//!   `compatible` property.
//!
//! Ownership and concurrency notes:
//! - The driver list is protected by an [RwLock]. It is cloned before probing
//!   so no bus lock is held while a driver runs.
//! - Bound devices are kept in registration order; [PlatformBus::shutdown]
//!   withdraws them newest first.

use crate::{
    debug_ex,
    error::{DeviceError, DeviceResult},
};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{
    fmt::{self, Debug, Display},
    sync::atomic::{AtomicU64, Ordering},
};
use dt::node::{DeviceTree, Node};
use log::{info, warn};
use spin::{Mutex, RwLock};

/// A descriptor node together with the tree it lives in.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor<'a> {
    pub tree: &'a DeviceTree,
    pub node: &'a Node,
}

impl<'a> Descriptor<'a> {
    pub fn new(tree: &'a DeviceTree, node: &'a Node) -> Descriptor<'a> {
        Descriptor { tree, node }
    }

    pub fn available_children(&self) -> Vec<&'a Node> {
        self.tree.available_children(self.node).collect()
    }
}

/// An announced device: a name, plus a descriptor when discovered from a tree.
#[derive(Debug, Clone, Copy)]
pub struct PlatformDevice<'a> {
    pub name: &'a str,
    pub descriptor: Option<Descriptor<'a>>,
}

impl<'a> PlatformDevice<'a> {
    pub fn node(&self) -> Option<&'a Node> {
        self.descriptor.map(|desc| desc.node)
    }
}

/// Driver-defined token for one successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Binding(pub u64);

/// Trait implemented by device families.
///
/// - [matches](Driver::matches) must be cheap and side-effect free; the bus
///   calls it on every registered driver in registration order.
/// - [probe](Driver::probe) either binds completely or leaves nothing behind.
/// - [remove](Driver::remove) receives only bindings previously returned by
///   `probe`.
pub trait Driver: Send + Sync + Debug {
    fn name(&self) -> &'static str;
    fn matches(&self, dev: &PlatformDevice<'_>) -> bool;
    fn probe(&self, dev: &PlatformDevice<'_>) -> DeviceResult<Binding>;
    fn remove(&self, binding: Binding) -> DeviceResult<()>;
}

/// Handle on a device bound through the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceKey(u64);

impl Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

#[derive(Debug)]
struct BoundDevice {
    key: DeviceKey,
    name: Box<str>,
    driver: Arc<dyn Driver>,
    binding: Binding,
}

#[derive(Debug, Default)]
pub struct PlatformBus {
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
    bound: Mutex<Vec<BoundDevice>>,
    next_key: AtomicU64,
}

impl PlatformBus {
    pub fn new() -> PlatformBus {
        PlatformBus::default()
    }

    /// Register a driver. Names must be unique.
    pub fn register_driver(&self, driver: Arc<dyn Driver>) -> DeviceResult<()> {
        let mut guard = self.drivers.write();
        if guard.iter().any(|drv| drv.name() == driver.name()) {
            return Err(DeviceError::AlreadyExists);
        }
        debug_ex!("\tRegistered driver '{}'.", driver.name());
        guard.push(driver);
        Ok(())
    }

    /// Hand an announcement to the first matching driver.
    pub fn announce(
        &self,
        name: &str,
        descriptor: Option<Descriptor<'_>>,
    ) -> DeviceResult<DeviceKey> {
        let dev = PlatformDevice { name, descriptor };
        let drivers = self.drivers.read().clone();
        let driver = drivers
            .into_iter()
            .find(|drv| drv.matches(&dev))
            .ok_or(DeviceError::Unmatched)?;
        info!("Platform: matched '{}' -> driver '{}'.", name, driver.name());

        let binding = driver.probe(&dev)?;
        let key = DeviceKey(self.next_key.fetch_add(1, Ordering::AcqRel));
        self.bound.lock().push(BoundDevice {
            key,
            name: Box::from(name),
            driver,
            binding,
        });
        Ok(key)
    }

    /// Announce every available node of `tree` that carries a `compatible`
    /// property, depth first. A bound node's subtree belongs to its driver
    /// and is not descended into. Failures are logged and the walk goes on.
    pub fn discover(&self, tree: &DeviceTree) -> Vec<DeviceKey> {
        debug_ex!("Discovering devices...");
        let mut keys = Vec::new();
        self.discover_under(tree, tree.root(), &mut keys);
        debug_ex!("Discovered {} devices.", keys.len());
        keys
    }

    fn discover_under(&self, tree: &DeviceTree, node: &Node, keys: &mut Vec<DeviceKey>) {
        for child in tree.available_children(node) {
            if child.property("compatible").is_some() {
                match self.announce(&child.full_name, Some(Descriptor::new(tree, child))) {
                    Ok(key) => {
                        keys.push(key);
                        continue;
                    }
                    Err(DeviceError::Unmatched) => {
                        debug_ex!("\tNo driver for {}.", tree.get_full_path(child));
                    }
                    Err(err) => {
                        warn!("Error probing device '{}': {}.", tree.get_full_path(child), err);
                    }
                }
            }
            self.discover_under(tree, child, keys);
        }
    }

    /// Remove a bound device through its driver.
    pub fn withdraw(&self, key: DeviceKey) -> DeviceResult<()> {
        let dev = {
            let mut guard = self.bound.lock();
            let pos = guard
                .iter()
                .position(|dev| dev.key == key)
                .ok_or(DeviceError::NotFound)?;
            guard.remove(pos)
        };
        info!("Platform: withdrawing '{}' from driver '{}'.", dev.name, dev.driver.name());
        dev.driver.remove(dev.binding)
    }

    /// Withdraw every bound device, newest first. Returns how many were
    /// removed cleanly.
    pub fn shutdown(&self) -> usize {
        let devices: Vec<BoundDevice> = core::mem::take(&mut *self.bound.lock());
        let mut removed = 0;
        for dev in devices.into_iter().rev() {
            match dev.driver.remove(dev.binding) {
                Ok(()) => removed += 1,
                Err(err) => warn!("Error removing device '{}': {}.", dev.name, err),
            }
        }
        removed
    }

    /// Names of bound devices with their keys, oldest first.
    pub fn bound_devices(&self) -> Vec<(DeviceKey, Box<str>)> {
        self.bound
            .lock()
            .iter()
            .map(|dev| (dev.key, dev.name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{string::String, vec};
    use dt::prop::Property;

    /// Matches nodes compatible with `comp`; records probes and removals.
    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        comp: &'static str,
        probed: Mutex<Vec<String>>,
        removed: Mutex<Vec<Binding>>,
    }

    impl Recorder {
        fn new(name: &'static str, comp: &'static str) -> Arc<Recorder> {
            Arc::new(Recorder {
                name,
                comp,
                probed: Mutex::new(vec![]),
                removed: Mutex::new(vec![]),
            })
        }
    }

    impl Driver for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn matches(&self, dev: &PlatformDevice<'_>) -> bool {
            dev.node().is_some_and(|node| node.is_compatible(self.comp)) || dev.name == self.comp
        }

        fn probe(&self, dev: &PlatformDevice<'_>) -> DeviceResult<Binding> {
            if dev.node().is_some_and(|node| node.property("broken").is_some()) {
                return Err(DeviceError::MalformedDescriptor { property: "broken" });
            }
            let mut probed = self.probed.lock();
            probed.push(String::from(dev.name));
            Ok(Binding(probed.len() as u64))
        }

        fn remove(&self, binding: Binding) -> DeviceResult<()> {
            self.removed.lock().push(binding);
            Ok(())
        }
    }

    fn tree() -> DeviceTree {
        let mut tree = DeviceTree::new();
        let soc = tree.add_node(0, "soc");
        let bus = tree.build_node(soc, "bus@0").compatible(&["simple-bus"]).finish();
        tree.build_node(bus, "dev@1").compatible(&["x,dev"]).finish();
        let parent = tree.build_node(soc, "parent@2").compatible(&["x,dev"]).finish();
        tree.build_node(parent, "hidden@3").compatible(&["x,dev"]).finish();
        tree.build_node(soc, "off@4")
            .compatible(&["x,dev"])
            .string("status", "disabled")
            .finish();
        tree.build_node(soc, "bad@5")
            .compatible(&["x,dev"])
            .prop(Property::empty("broken"))
            .finish();
        tree
    }

    #[test]
    fn discovery_skips_bound_subtrees_and_disabled_nodes() {
        let bus = PlatformBus::new();
        let driver = Recorder::new("recorder", "x,dev");
        bus.register_driver(driver.clone()).unwrap();
        let keys = bus.discover(&tree());
        assert_eq!(keys.len(), 2);
        assert_eq!(*driver.probed.lock(), vec!["dev@1", "parent@2"]);
    }

    #[test]
    fn announce_without_match_is_unmatched() {
        let bus = PlatformBus::new();
        bus.register_driver(Recorder::new("recorder", "x,dev")).unwrap();
        assert_eq!(bus.announce("other", None), Err(DeviceError::Unmatched));
        assert!(bus.announce("x,dev", None).is_ok());
    }

    #[test]
    fn duplicate_driver_names_are_rejected() {
        let bus = PlatformBus::new();
        bus.register_driver(Recorder::new("recorder", "a")).unwrap();
        assert_eq!(
            bus.register_driver(Recorder::new("recorder", "b")),
            Err(DeviceError::AlreadyExists)
        );
    }

    #[test]
    fn withdraw_and_shutdown_remove_through_the_driver() {
        let bus = PlatformBus::new();
        let driver = Recorder::new("recorder", "x,dev");
        bus.register_driver(driver.clone()).unwrap();
        let first = bus.announce("x,dev", None).unwrap();
        bus.announce("x,dev", None).unwrap();
        bus.announce("x,dev", None).unwrap();

        bus.withdraw(first).unwrap();
        assert_eq!(bus.withdraw(first), Err(DeviceError::NotFound));
        assert_eq!(bus.shutdown(), 2);
        assert_eq!(*driver.removed.lock(), vec![Binding(1), Binding(3), Binding(2)]);
        assert!(bus.bound_devices().is_empty());
    }
}
