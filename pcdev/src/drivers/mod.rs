//! Device families bound through the platform bus.

pub mod gpio;
pub mod pcdev;

use crate::{driver::PlatformBus, error::DeviceResult, registry::DriverRegistry};
use alloc::sync::Arc;
use self::gpio::{GpioProvider, GpioSysfsDriver};
use self::pcdev::PcdevDriver;

/// Register every family on `bus`. The GPIO family is only registered when
/// the host supplies a line provider.
pub fn register_drivers(
    bus: &PlatformBus,
    registry: Arc<DriverRegistry>,
    gpio: Option<Arc<dyn GpioProvider>>,
) -> DeviceResult<()> {
    let attrs = registry.attributes();
    bus.register_driver(Arc::new(PcdevDriver::new(registry)))?;
    if let Some(provider) = gpio {
        bus.register_driver(Arc::new(GpioSysfsDriver::new(provider, attrs)))?;
    }
    Ok(())
}
