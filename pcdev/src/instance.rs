//! Device instances and the table that owns them.
//!
//! Ownership and concurrency notes:
//! - [InstanceTable] is the only owner of instances. The stream and attribute
//!   interfaces keep [InstanceId]s and resolve them on every operation, so a
//!   handle that outlives its instance fails with
//!   [DeviceError::StaleInstance] instead of reaching freed state.
//! - The map is protected by an [RwLock]: lookups take the read side, bind and
//!   unbind the write side, and neither is held during a transfer.
//! - Per-instance state sits behind its own [Mutex]; transfers and resizes on
//!   one instance never block another.
//! - An instance enters the table before its bind finishes, so the class
//!   layer can already open it. Only once marked bound can it be unbound.

use crate::{
    error::{DeviceError, DeviceResult},
    platform::DeviceConfig,
};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use core::{
    fmt::{self, Display},
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};
use spin::{Mutex, MutexGuard, RwLock};

/// Ordinal identity of an instance. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable part of an instance, guarded by [Instance::lock_live].
#[derive(Debug)]
pub struct InstanceState {
    pub config: DeviceConfig,
    pub buffer: Vec<u8>,
    live: bool,
}

impl InstanceState {
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

#[derive(Debug)]
pub struct Instance {
    id: InstanceId,
    node_name: Box<str>,
    state: Mutex<InstanceState>,
    open_count: AtomicUsize,
    bound: AtomicBool,
}

/// Allocate a zeroed buffer, reporting failure instead of aborting.
pub fn alloc_buffer(len: usize) -> DeviceResult<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| DeviceError::AllocationFailed)?;
    buffer.resize(len, 0);
    Ok(buffer)
}

impl Instance {
    /// Create a live instance with a zeroed buffer of `config.capacity` bytes.
    pub fn new(id: InstanceId, node_name: &str, config: DeviceConfig) -> DeviceResult<Instance> {
        let buffer = alloc_buffer(config.capacity)?;
        Ok(Instance {
            id,
            node_name: Box::from(node_name),
            state: Mutex::new(InstanceState {
                config,
                buffer,
                live: true,
            }),
            open_count: AtomicUsize::new(0),
            bound: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Whether the bind that created this instance has completed.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    pub(crate) fn mark_bound(&self) {
        self.bound.store(true, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.state.lock().live
    }

    /// Lock the state, failing if the instance has been unbound.
    pub fn lock_live(&self) -> DeviceResult<MutexGuard<'_, InstanceState>> {
        let guard = self.state.lock();
        if !guard.live {
            return Err(DeviceError::StaleInstance);
        }
        Ok(guard)
    }

    /// Mark the instance dead and release its buffer. Operations already
    /// holding a reference fail from now on.
    pub fn retire(&self) {
        let mut guard = self.state.lock();
        guard.live = false;
        guard.buffer = Vec::new();
    }

    /// Replace the buffer with a zeroed one of `capacity` bytes. The new
    /// buffer is allocated before the lock is taken, so on failure the old
    /// one is untouched.
    pub fn resize(&self, capacity: usize) -> DeviceResult<()> {
        if capacity == 0 {
            return Err(DeviceError::InvalidValue);
        }
        let buffer = alloc_buffer(capacity)?;
        let mut guard = self.lock_live()?;
        guard.buffer = buffer;
        guard.config.capacity = capacity;
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::Acquire)
    }

    pub(crate) fn inc_open(&self) {
        self.open_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_open(&self) {
        // saturate, close never fails
        let _ = self
            .open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Owner of every live instance.
#[derive(Debug, Default)]
pub struct InstanceTable {
    instances: RwLock<BTreeMap<InstanceId, Arc<Instance>>>,
    next_id: AtomicU64,
}

impl InstanceTable {
    pub fn new() -> InstanceTable {
        InstanceTable::default()
    }

    /// Hand out the next id. Ids of failed binds are burnt, not recycled.
    pub fn allocate_id(&self) -> InstanceId {
        InstanceId(self.next_id.fetch_add(1, Ordering::AcqRel))
    }

    pub fn insert(&self, instance: Arc<Instance>) {
        self.instances.write().insert(instance.id(), instance);
    }

    pub fn remove(&self, id: InstanceId) -> Option<Arc<Instance>> {
        self.instances.write().remove(&id)
    }

    /// Remove an instance whose bind has completed. Instances still being
    /// bound stay in place and yield `None`.
    pub fn remove_bound(&self, id: InstanceId) -> Option<Arc<Instance>> {
        let mut instances = self.instances.write();
        if !instances.get(&id)?.is_bound() {
            return None;
        }
        instances.remove(&id)
    }

    /// Resolve an id. Ids that were handed out but are no longer present are
    /// stale; ids never handed out are unknown.
    pub fn get(&self, id: InstanceId) -> DeviceResult<Arc<Instance>> {
        if let Some(instance) = self.instances.read().get(&id) {
            return Ok(instance.clone());
        }
        if id.0 < self.next_id.load(Ordering::Acquire) {
            Err(DeviceError::StaleInstance)
        } else {
            Err(DeviceError::NotFound)
        }
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bound_ids(&self) -> Vec<InstanceId> {
        self.instances
            .read()
            .values()
            .filter(|instance| instance.is_bound())
            .map(|instance| instance.id())
            .collect()
    }
}
