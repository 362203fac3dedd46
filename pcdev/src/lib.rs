//! pcdev: platform pseudo-device framework.
//!
//! Devices announced from a static table or discovered in a device tree are
//! matched to a configuration, bound to an instance with its own byte buffer,
//! and exposed both as a seekable stream and as a group of attributes.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod attr;
pub mod class;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod instance;
pub mod logging;
pub mod matching;
pub mod platform;
pub mod registry;
pub mod stream;

pub use error::{DeviceError, DeviceResult};
pub use instance::InstanceId;
pub use platform::{AccessPolicy, DeviceConfig, Settings};
pub use registry::DriverRegistry;
pub use stream::{OpenMode, SeekWhence, StreamHandle};
