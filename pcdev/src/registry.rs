//! Device instance lifecycle manager.
//!
//! [DriverRegistry] is the process-wide state of the framework: it binds
//! announcements to new instances and tears them down again. A bind runs, in
//! order:
//! 1. matching ([Matcher::resolve]),
//! 2. tuning lookup (missing entries only warn),
//! 3. slot reservation against [Settings::max_instances],
//! 4. id and buffer allocation, and insertion into the instance table,
//! 5. stream endpoint, attribute group and class node registration,
//! 6. marking the instance bound.
//!
//! Any failure from step 3 on undoes the steps before it. Between steps 4 and
//! 6 the instance can be opened through its id or endpoint, but it is neither
//! counted as live nor removable by [DriverRegistry::unbind].

use crate::{
    attr::{AttributeExport, AttributeRef, PCDEV_ATTRS, PcdevAttributes},
    class::{DeviceClass, NullClass},
    debug_ex,
    error::{DeviceError, DeviceResult},
    instance::{Instance, InstanceId, InstanceTable},
    matching::Matcher,
    platform::{DeviceConfig, Settings, TuningTable},
    stream::{OpenMode, StreamHandle, StreamInterface},
};
use alloc::{boxed::Box, format, string::String, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};
use dt::node::Node;
use log::{info, warn};

#[derive(Debug)]
pub struct DriverRegistry {
    matcher: Matcher,
    tuning: TuningTable,
    settings: Settings,
    table: Arc<InstanceTable>,
    streams: StreamInterface,
    attrs: Arc<AttributeExport>,
    class: Box<dyn DeviceClass>,
    /// Slots taken against `max_instances`, including binds in flight.
    reserved: AtomicUsize,
    live: AtomicUsize,
}

impl DriverRegistry {
    pub fn new(
        matcher: Matcher,
        tuning: TuningTable,
        settings: Settings,
        class: Box<dyn DeviceClass>,
    ) -> DriverRegistry {
        let table = Arc::new(InstanceTable::new());
        DriverRegistry {
            matcher,
            tuning,
            settings,
            streams: StreamInterface::new(table.clone()),
            table,
            attrs: Arc::new(AttributeExport::new()),
            class,
            reserved: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        }
    }

    /// Registry over the generated platform tables, exposing nothing.
    pub fn with_platform_defaults() -> DriverRegistry {
        DriverRegistry::new(
            Matcher::from_platform(),
            TuningTable::from_platform(),
            Settings::default(),
            Box::new(NullClass),
        )
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn streams(&self) -> &StreamInterface {
        &self.streams
    }

    /// The attribute export shared with other device families.
    pub fn attributes(&self) -> Arc<AttributeExport> {
        self.attrs.clone()
    }

    pub fn total_live_instances(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.table.bound_ids()
    }

    pub fn node_name(&self, id: InstanceId) -> DeviceResult<String> {
        Ok(String::from(self.table.get(id)?.node_name()))
    }

    pub fn open_count(&self, id: InstanceId) -> DeviceResult<usize> {
        Ok(self.table.get(id)?.open_count())
    }
}

// region: bind / unbind

impl DriverRegistry {
    /// Create an instance for an announcement.
    pub fn bind(&self, name: &str, node: Option<&Node>) -> DeviceResult<InstanceId> {
        let matched = self.matcher.resolve(name, node).inspect_err(|err| {
            warn!("Probe of '{}' failed: {}.", name, err);
        })?;
        debug_ex!("Matched '{}' from {:?}.", name, matched.source);
        self.report_tuning(name, &matched.config);

        self.reserve_slot()?;
        match self.instantiate(matched.config) {
            Ok(id) => {
                info!("Probe of '{}' was successful, instance {}.", name, id);
                Ok(id)
            }
            Err(err) => {
                self.release_slot();
                warn!("Probe of '{}' failed: {}.", name, err);
                Err(err)
            }
        }
    }

    /// Tear an instance down. Open handles on it go stale.
    pub fn unbind(&self, id: InstanceId) -> DeviceResult<()> {
        let instance = self.table.remove_bound(id).ok_or(DeviceError::NotFound)?;
        let node = instance.node_name();
        self.streams.unregister(node);
        self.attrs.unexport(node);
        self.class.destroy_node(node);
        instance.retire();
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.release_slot();
        info!("Instance {} ({}) removed.", id, node);
        Ok(())
    }

    /// Unbind every live instance; returns how many were torn down.
    pub fn shutdown(&self) -> usize {
        let count = self
            .table
            .bound_ids()
            .into_iter()
            .filter(|id| self.unbind(*id).is_ok())
            .count();
        info!("Registry shut down, {} instances removed.", count);
        count
    }

    fn report_tuning(&self, name: &str, config: &DeviceConfig) {
        let entry = config.tuning_tag.and_then(|tag| self.tuning.lookup(tag));
        match entry {
            Some(entry) => {
                info!(
                    "'{}': {:?} config item 1 = {}, config item 2 = {}.",
                    name, entry.tag, entry.param_a, entry.param_b
                );
            }
            None => warn!("'{}': no tuning entry for tag {:?}.", name, config.tuning_tag),
        }
        debug_ex!(
            "'{}': capacity = {}, policy = {}, identity = {}.",
            name,
            config.capacity,
            config.access_policy,
            config.identity
        );
    }

    fn reserve_slot(&self) -> DeviceResult<()> {
        let max = self.settings.max_instances;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| DeviceError::AllocationFailed)
    }

    fn release_slot(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }

    fn instantiate(&self, config: DeviceConfig) -> DeviceResult<InstanceId> {
        let id = self.table.allocate_id();
        let node_name = format!("{}-{}", self.settings.node_prefix, id);
        let instance = Arc::new(Instance::new(id, &node_name, config)?);
        self.table.insert(instance.clone());
        if let Err(err) = self.register(id, &node_name) {
            self.table.remove(id);
            instance.retire();
            return Err(err);
        }
        // count before marking, an unbind may follow right after
        self.live.fetch_add(1, Ordering::AcqRel);
        instance.mark_bound();
        Ok(id)
    }

    fn register(&self, id: InstanceId, node_name: &str) -> DeviceResult<()> {
        self.streams.register(node_name, id)?;
        let source = Arc::new(PcdevAttributes::new(id, self.table.clone()));
        if let Err(err) = self.attrs.export(node_name, &PCDEV_ATTRS, source) {
            self.streams.unregister(node_name);
            return Err(err);
        }
        debug_ex!(
            "Exported group '{}' for '{}'.",
            ::config::ATTR_GROUP_NAME,
            node_name
        );
        if let Err(err) = self.class.create_node(node_name, id) {
            self.attrs.unexport(node_name);
            self.streams.unregister(node_name);
            return Err(err);
        }
        debug_ex!("Created node '{}' in class '{}'.", node_name, self.class.class_name());
        Ok(())
    }
}

// endregion

// region: interface shortcuts

impl DriverRegistry {
    pub fn open(&self, id: InstanceId, mode: OpenMode) -> DeviceResult<StreamHandle> {
        self.streams.open(id, mode)
    }

    pub fn close(&self, handle: StreamHandle) {
        self.streams.close(handle)
    }

    /// Attribute group of an instance.
    pub fn attr(&self, id: InstanceId) -> DeviceResult<AttributeRef> {
        let instance = self.table.get(id)?;
        self.attrs.lookup(instance.node_name())
    }

    pub fn attr_show(&self, id: InstanceId, attr: &str) -> DeviceResult<String> {
        self.attr(id)?.show(attr)
    }

    pub fn attr_store(&self, id: InstanceId, attr: &str, value: &str) -> DeviceResult<()> {
        self.attr(id)?.store(attr, value)
    }
}

// endregion
