//! Device class: the host capability that exposes an instance under a name.

use crate::{debug_ex, error::DeviceResult, instance::InstanceId};
use core::fmt::Debug;

/// Creates and removes host-visible nodes.
///
/// [create_node](DeviceClass::create_node) is the last step of a bind; a
/// failure there rolls the whole bind back. `destroy_node` is only called for
/// names previously created.
pub trait DeviceClass: Send + Sync + Debug {
    fn class_name(&self) -> &str;
    fn create_node(&self, name: &str, id: InstanceId) -> DeviceResult<()>;
    fn destroy_node(&self, name: &str);
}

/// A class that exposes nothing. Used when the host has no node layer.
#[derive(Debug, Default)]
pub struct NullClass;

impl DeviceClass for NullClass {
    fn class_name(&self) -> &str {
        ::config::CLASS_NAME
    }

    fn create_node(&self, name: &str, id: InstanceId) -> DeviceResult<()> {
        debug_ex!("Node '{}' for instance {} left unexposed.", name, id);
        Ok(())
    }

    fn destroy_node(&self, _name: &str) {}
}
