//! Access-controlled stream interface.
//!
//! Every live instance is registered here as an openable endpoint. A
//! [StreamHandle] carries the instance id, the mode it was opened with and its
//! own position; each transfer resolves the id again, so an unbound instance
//! fails closed with [DeviceError::StaleInstance].
//!
//! Transfers hold the handle's position lock and then the instance lock for
//! the whole check-size / copy / advance sequence.

use crate::{
    debug_ex,
    error::{DeviceError, DeviceResult},
    instance::{InstanceId, InstanceTable},
    platform::AccessPolicy,
};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use bitflags::bitflags;
use log::info;
use num_enum::TryFromPrimitive;
use spin::{Mutex, RwLock};

bitflags! {
    /// Access requested at open time.
    pub struct OpenMode: u32 {
        const READ  = 0b01;
        const WRITE = 0b10;
    }
}

/// Origin of a seek offset. The discriminants are the host's `SEEK_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum SeekWhence {
    FromStart = 0,
    FromCurrent = 1,
    FromEnd = 2,
}

impl SeekWhence {
    /// Convert a raw host whence; unknown values are an invalid seek.
    pub fn from_raw(raw: u32) -> DeviceResult<SeekWhence> {
        SeekWhence::try_from(raw).map_err(|_| DeviceError::InvalidSeek)
    }
}

/// Decide whether `mode` may be opened on a device with `policy`.
///
/// A read-only device only accepts a read-only open and a write-only device
/// a write-only open; a read/write device accepts any non-empty mode.
pub fn check_permission(policy: AccessPolicy, mode: OpenMode) -> DeviceResult<()> {
    let allowed = match policy {
        AccessPolicy::ReadWrite => !mode.is_empty(),
        AccessPolicy::ReadOnly => mode == OpenMode::READ,
        AccessPolicy::WriteOnly => mode == OpenMode::WRITE,
    };
    if allowed {
        Ok(())
    } else {
        Err(DeviceError::PermissionDenied)
    }
}

/// An open stream on one instance.
#[derive(Debug)]
pub struct StreamHandle {
    id: InstanceId,
    mode: OpenMode,
    position: Mutex<usize>,
}

impl StreamHandle {
    pub fn instance_id(&self) -> InstanceId {
        self.id
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn position(&self) -> usize {
        *self.position.lock()
    }

    fn require(&self, mode: OpenMode) -> DeviceResult<()> {
        if self.mode.contains(mode) {
            Ok(())
        } else {
            Err(DeviceError::PermissionDenied)
        }
    }
}

#[derive(Debug)]
pub struct StreamInterface {
    table: Arc<InstanceTable>,
    endpoints: RwLock<BTreeMap<Box<str>, InstanceId>>,
}

// region: endpoint registration

impl StreamInterface {
    pub fn new(table: Arc<InstanceTable>) -> StreamInterface {
        StreamInterface {
            table,
            endpoints: RwLock::new(BTreeMap::new()),
        }
    }

    /// Make `id` openable under `name`.
    pub fn register(&self, name: &str, id: InstanceId) -> DeviceResult<()> {
        let mut guard = self.endpoints.write();
        if guard.contains_key(name) {
            return Err(DeviceError::AlreadyExists);
        }
        guard.insert(Box::from(name), id);
        Ok(())
    }

    /// Detach an endpoint. Open handles are left alone; they go stale once
    /// the instance itself is removed.
    pub fn unregister(&self, name: &str) -> Option<InstanceId> {
        self.endpoints.write().remove(name)
    }

    pub fn lookup(&self, name: &str) -> DeviceResult<InstanceId> {
        self.endpoints
            .read()
            .get(name)
            .copied()
            .ok_or(DeviceError::NotFound)
    }

    /// Registered endpoints, ordered by name.
    pub fn endpoints(&self) -> Vec<(Box<str>, InstanceId)> {
        self.endpoints
            .read()
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }
}

// endregion

// region: file operations

impl StreamInterface {
    pub fn open(&self, id: InstanceId, mode: OpenMode) -> DeviceResult<StreamHandle> {
        let instance = self.table.get(id)?;
        let policy = instance.lock_live()?.config.access_policy;
        if let Err(err) = check_permission(policy, mode) {
            info!("Open of instance {} ({:?}) on a {} device was unsuccessful.", id, mode, policy);
            return Err(err);
        }
        instance.inc_open();
        info!("Open of instance {} was successful.", id);
        Ok(StreamHandle {
            id,
            mode,
            position: Mutex::new(0),
        })
    }

    pub fn open_by_name(&self, name: &str, mode: OpenMode) -> DeviceResult<StreamHandle> {
        self.open(self.lookup(name)?, mode)
    }

    /// Read at the handle's position into `buf`, clipped to the end of the
    /// buffer. Returns `Ok(0)` at or past the end. A stale handle fails as
    /// stale whatever its mode.
    pub fn read(&self, handle: &StreamHandle, buf: &mut [u8]) -> DeviceResult<usize> {
        let instance = self.table.get(handle.id)?;
        let mut pos = handle.position.lock();
        let state = instance.lock_live()?;
        handle.require(OpenMode::READ)?;
        debug_ex!("Read requested for {} bytes at position {}.", buf.len(), *pos);

        let count = buf.len().min(state.capacity().saturating_sub(*pos));
        if count == 0 {
            // position may sit past the end after a shrink
            return Ok(0);
        }
        buf[..count].copy_from_slice(&state.buffer[*pos..*pos + count]);
        *pos += count;

        debug_ex!("Read {} bytes, position now {}.", count, *pos);
        Ok(count)
    }

    /// Write `data` at the handle's position, clipped to the end of the
    /// buffer. Fails with [DeviceError::NoSpace] when nothing can be written.
    pub fn write(&self, handle: &StreamHandle, data: &[u8]) -> DeviceResult<usize> {
        let instance = self.table.get(handle.id)?;
        let mut pos = handle.position.lock();
        let mut state = instance.lock_live()?;
        handle.require(OpenMode::WRITE)?;
        debug_ex!("Write requested for {} bytes at position {}.", data.len(), *pos);

        let count = data.len().min(state.capacity().saturating_sub(*pos));
        if count == 0 {
            return Err(DeviceError::NoSpace);
        }
        state.buffer[*pos..*pos + count].copy_from_slice(&data[..count]);
        *pos += count;

        debug_ex!("Wrote {} bytes, position now {}.", count, *pos);
        Ok(count)
    }

    /// Move the position. The target must lie in `0..=capacity`; otherwise
    /// the position is left unchanged.
    pub fn seek(
        &self,
        handle: &StreamHandle,
        offset: i64,
        whence: SeekWhence,
    ) -> DeviceResult<usize> {
        let instance = self.table.get(handle.id)?;
        let mut pos = handle.position.lock();
        let state = instance.lock_live()?;

        let capacity = state.capacity() as i128;
        let base = match whence {
            SeekWhence::FromStart => 0,
            SeekWhence::FromCurrent => *pos as i128,
            SeekWhence::FromEnd => capacity,
        };
        let target = base + i128::from(offset);
        if target < 0 || target > capacity {
            return Err(DeviceError::InvalidSeek);
        }
        *pos = target as usize;

        debug_ex!("New value of the position = {}.", *pos);
        Ok(*pos)
    }

    /// Release a handle. Never fails, including on a stale handle.
    pub fn close(&self, handle: StreamHandle) {
        if let Ok(instance) = self.table.get(handle.id) {
            instance.dec_open();
        }
        info!("Released handle on instance {}.", handle.id);
    }
}

// endregion

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instance::Instance,
        platform::{AccessPolicy, DeviceConfig},
    };

    fn setup(
        capacity: usize,
        policy: AccessPolicy,
    ) -> (Arc<InstanceTable>, StreamInterface, InstanceId) {
        let table = Arc::new(InstanceTable::new());
        let id = table.allocate_id();
        let config = DeviceConfig::new(capacity, policy, "T", None).unwrap();
        table.insert(Arc::new(Instance::new(id, "pcdev-0", config).unwrap()));
        let streams = StreamInterface::new(table.clone());
        streams.register("pcdev-0", id).unwrap();
        (table, streams, id)
    }

    #[test]
    fn permission_table() {
        use AccessPolicy::*;
        let rw = OpenMode::READ | OpenMode::WRITE;
        assert!(check_permission(ReadOnly, OpenMode::READ).is_ok());
        assert!(check_permission(ReadOnly, OpenMode::WRITE).is_err());
        assert!(check_permission(ReadOnly, rw).is_err());
        assert!(check_permission(WriteOnly, OpenMode::READ).is_err());
        assert!(check_permission(WriteOnly, OpenMode::WRITE).is_ok());
        assert!(check_permission(WriteOnly, rw).is_err());
        assert!(check_permission(ReadWrite, OpenMode::READ).is_ok());
        assert!(check_permission(ReadWrite, OpenMode::WRITE).is_ok());
        assert!(check_permission(ReadWrite, rw).is_ok());
        assert!(check_permission(ReadWrite, OpenMode::empty()).is_err());
    }

    #[test]
    fn write_then_read_back_from_same_position() {
        let (_table, streams, id) = setup(8, AccessPolicy::ReadWrite);
        let handle = streams.open(id, OpenMode::READ | OpenMode::WRITE).unwrap();
        streams.seek(&handle, 2, SeekWhence::FromStart).unwrap();
        assert_eq!(streams.write(&handle, b"hello world"), Ok(6));
        assert_eq!(handle.position(), 8);

        streams.seek(&handle, 2, SeekWhence::FromStart).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(streams.read(&handle, &mut buf), Ok(6));
        assert_eq!(&buf[..6], b"hello ");
    }

    #[test]
    fn read_at_end_is_empty_but_write_at_end_fails() {
        let (_table, streams, id) = setup(4, AccessPolicy::ReadWrite);
        let handle = streams.open(id, OpenMode::READ | OpenMode::WRITE).unwrap();
        assert_eq!(streams.seek(&handle, 0, SeekWhence::FromEnd), Ok(4));
        let mut buf = [0u8; 4];
        assert_eq!(streams.read(&handle, &mut buf), Ok(0));
        assert_eq!(streams.write(&handle, b"x"), Err(DeviceError::NoSpace));
        assert_eq!(handle.position(), 4);
    }

    #[test]
    fn seek_bounds_are_inclusive_of_capacity() {
        let (_table, streams, id) = setup(16, AccessPolicy::ReadOnly);
        let handle = streams.open(id, OpenMode::READ).unwrap();
        assert_eq!(streams.seek(&handle, 16, SeekWhence::FromStart), Ok(16));
        assert_eq!(
            streams.seek(&handle, 17, SeekWhence::FromStart),
            Err(DeviceError::InvalidSeek)
        );
        assert_eq!(
            streams.seek(&handle, -1, SeekWhence::FromStart),
            Err(DeviceError::InvalidSeek)
        );
        assert_eq!(handle.position(), 16);
        assert_eq!(streams.seek(&handle, -6, SeekWhence::FromCurrent), Ok(10));
        assert_eq!(
            streams.seek(&handle, 1, SeekWhence::FromEnd),
            Err(DeviceError::InvalidSeek)
        );
        assert_eq!(streams.seek(&handle, -16, SeekWhence::FromEnd), Ok(0));
        assert_eq!(
            streams.seek(&handle, i64::MIN, SeekWhence::FromCurrent),
            Err(DeviceError::InvalidSeek)
        );
    }

    #[test]
    fn raw_whence_values() {
        assert_eq!(SeekWhence::from_raw(1), Ok(SeekWhence::FromCurrent));
        assert_eq!(SeekWhence::from_raw(3), Err(DeviceError::InvalidSeek));
    }

    #[test]
    fn handle_mode_gates_transfers() {
        let (_table, streams, id) = setup(4, AccessPolicy::ReadWrite);
        let reader = streams.open(id, OpenMode::READ).unwrap();
        assert_eq!(streams.write(&reader, b"a"), Err(DeviceError::PermissionDenied));
        let writer = streams.open(id, OpenMode::WRITE).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(streams.read(&writer, &mut buf), Err(DeviceError::PermissionDenied));
    }

    #[test]
    fn open_and_close_track_open_count() {
        let (table, streams, id) = setup(4, AccessPolicy::ReadOnly);
        assert_eq!(
            streams.open_by_name("pcdev-0", OpenMode::WRITE).err(),
            Some(DeviceError::PermissionDenied)
        );
        let a = streams.open_by_name("pcdev-0", OpenMode::READ).unwrap();
        let b = streams.open(id, OpenMode::READ).unwrap();
        let instance = table.get(id).unwrap();
        assert_eq!(instance.open_count(), 2);
        streams.close(a);
        streams.close(b);
        assert_eq!(instance.open_count(), 0);
    }

    #[test]
    fn handles_go_stale_when_instance_is_removed() {
        let (table, streams, id) = setup(4, AccessPolicy::ReadWrite);
        let handle = streams.open(id, OpenMode::READ | OpenMode::WRITE).unwrap();
        table.remove(id).unwrap().retire();
        let mut buf = [0u8; 1];
        assert_eq!(streams.read(&handle, &mut buf), Err(DeviceError::StaleInstance));
        assert_eq!(streams.write(&handle, b"a"), Err(DeviceError::StaleInstance));
        assert_eq!(
            streams.seek(&handle, 0, SeekWhence::FromStart),
            Err(DeviceError::StaleInstance)
        );
        streams.close(handle);
    }

    #[test]
    fn stale_handles_report_staleness_before_mode() {
        let (table, streams, id) = setup(4, AccessPolicy::ReadWrite);
        let reader = streams.open(id, OpenMode::READ).unwrap();
        let writer = streams.open(id, OpenMode::WRITE).unwrap();
        table.remove(id).unwrap().retire();
        let mut buf = [0u8; 1];
        assert_eq!(streams.write(&reader, b"a"), Err(DeviceError::StaleInstance));
        assert_eq!(streams.read(&writer, &mut buf), Err(DeviceError::StaleInstance));
    }

    #[test]
    fn duplicate_endpoint_names_are_rejected() {
        let (_table, streams, id) = setup(4, AccessPolicy::ReadWrite);
        assert_eq!(streams.register("pcdev-0", id), Err(DeviceError::AlreadyExists));
        assert_eq!(streams.unregister("pcdev-0"), Some(id));
        assert_eq!(streams.lookup("pcdev-0"), Err(DeviceError::NotFound));
    }
}
