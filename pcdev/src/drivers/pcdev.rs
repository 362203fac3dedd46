//! Pseudo char device family.

use crate::{
    driver::{Binding, Driver, PlatformDevice},
    error::DeviceResult,
    instance::InstanceId,
    registry::DriverRegistry,
};
use alloc::sync::Arc;

/// Binds announcements through a [DriverRegistry]. The binding carries the
/// instance id.
#[derive(Debug)]
pub struct PcdevDriver {
    registry: Arc<DriverRegistry>,
}

impl PcdevDriver {
    pub fn new(registry: Arc<DriverRegistry>) -> PcdevDriver {
        PcdevDriver { registry }
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }
}

impl Driver for PcdevDriver {
    fn name(&self) -> &'static str {
        "pseudo-char-device"
    }

    fn matches(&self, dev: &PlatformDevice<'_>) -> bool {
        let matcher = self.registry.matcher();
        matcher.matches_name(dev.name) || dev.node().is_some_and(|node| matcher.matches_node(node))
    }

    fn probe(&self, dev: &PlatformDevice<'_>) -> DeviceResult<Binding> {
        let id = self.registry.bind(dev.name, dev.node())?;
        Ok(Binding(id.0))
    }

    fn remove(&self, binding: Binding) -> DeviceResult<()> {
        self.registry.unbind(InstanceId(binding.0))
    }
}
