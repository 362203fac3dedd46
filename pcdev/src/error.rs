//! Error type shared by every operation of the framework.

use core::fmt::{self, Display};
use dt::prop::PropertyError;

/// Errors returned by the matching engine, the lifecycle manager and both
/// device interfaces. None of them is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// No configuration source matched the announcement.
    Unmatched,
    /// A descriptor node was present but a required property was missing or invalid.
    MalformedDescriptor { property: &'static str },
    /// Buffer, instance slot or bookkeeping allocation failed.
    AllocationFailed,
    /// The requested access is not allowed by the device's policy.
    PermissionDenied,
    /// A write would transfer zero bytes because the position is at or past the end.
    NoSpace,
    /// A seek target is outside `0..=capacity`, or the whence is unknown.
    InvalidSeek,
    /// The instance behind a handle or attribute reference has been unbound.
    StaleInstance,
    /// Unknown instance, node, endpoint or binding.
    NotFound,
    /// An attribute value could not be parsed or is out of range.
    InvalidValue,
    /// The attribute group has no attribute of that name.
    NoSuchAttribute,
    /// A node, endpoint or attribute group of that name is already registered.
    AlreadyExists,
    /// The host has no line assigned to a requested GPIO.
    NoDevice,
    /// The host capability reported a failure.
    Io,
}

impl DeviceError {
    /// Negative errno as the host kernel interfaces would report it.
    pub fn to_errno(&self) -> isize {
        match self {
            // EPERM
            DeviceError::PermissionDenied => -1,
            // ENOENT
            DeviceError::NotFound | DeviceError::NoSuchAttribute => -2,
            // EIO
            DeviceError::Io => -5,
            // ENOMEM, the write path reports a full buffer the same way
            DeviceError::AllocationFailed | DeviceError::NoSpace => -12,
            // EEXIST
            DeviceError::AlreadyExists => -17,
            // ENODEV
            DeviceError::NoDevice | DeviceError::Unmatched => -19,
            // EINVAL
            DeviceError::MalformedDescriptor { .. }
            | DeviceError::InvalidSeek
            | DeviceError::InvalidValue => -22,
            // ESTALE
            DeviceError::StaleInstance => -116,
        }
    }

    /// Convert a descriptor property error for `property`.
    pub fn descriptor(property: &'static str) -> impl Fn(PropertyError) -> DeviceError {
        move |_| DeviceError::MalformedDescriptor { property }
    }
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unmatched => write!(f, "no configuration source matched"),
            DeviceError::MalformedDescriptor { property } => {
                write!(f, "descriptor property '{}' is missing or invalid", property)
            }
            DeviceError::AllocationFailed => write!(f, "allocation failed"),
            DeviceError::PermissionDenied => write!(f, "permission denied"),
            DeviceError::NoSpace => write!(f, "no space left in device buffer"),
            DeviceError::InvalidSeek => write!(f, "seek target out of range"),
            DeviceError::StaleInstance => write!(f, "device instance has been unbound"),
            DeviceError::NotFound => write!(f, "not found"),
            DeviceError::InvalidValue => write!(f, "invalid attribute value"),
            DeviceError::NoSuchAttribute => write!(f, "no such attribute"),
            DeviceError::AlreadyExists => write!(f, "already exists"),
            DeviceError::NoDevice => write!(f, "no device assigned"),
            DeviceError::Io => write!(f, "I/O error"),
        }
    }
}

impl core::error::Error for DeviceError {}

/// Shorthand used across the crate.
pub type DeviceResult<T> = Result<T, DeviceError>;
