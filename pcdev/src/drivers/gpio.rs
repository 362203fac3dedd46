//! GPIO attribute device family.
//!
//! Each available child of an `org,bone-gpio-sysfs` node is one line. The
//! line is requested from the host, driven low and exported as an attribute
//! group named by its label.

use crate::{
    attr::{AttributeDesc, AttributeExport, AttributeSource},
    driver::{Binding, Driver, PlatformDevice},
    error::{DeviceError, DeviceResult},
};
use alloc::{
    boxed::Box,
    collections::btree_map::BTreeMap,
    format,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
};
use dt::node::Node;
use log::{error, info, warn};
use spin::Mutex;

pub const GPIO_SYSFS_COMPAT: &str = "org,bone-gpio-sysfs";
pub const PROP_LABEL: &str = "label";

pub const ATTR_DIRECTION: &str = "direction";
pub const ATTR_VALUE: &str = "value";
pub const ATTR_LABEL: &str = "label";

static GPIO_ATTRS: [AttributeDesc; 3] = [
    AttributeDesc::rw(ATTR_DIRECTION),
    AttributeDesc::rw(ATTR_VALUE),
    AttributeDesc::ro(ATTR_LABEL),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Failures reported by the host GPIO layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    /// No line is assigned to the requested function.
    Unassigned,
    /// The controller rejected the operation.
    Io,
}

impl From<GpioError> for DeviceError {
    fn from(err: GpioError) -> Self {
        match err {
            GpioError::Unassigned => DeviceError::NoDevice,
            GpioError::Io => DeviceError::Io,
        }
    }
}

/// One GPIO line owned by the host.
pub trait GpioLine: Send + Sync + Debug {
    fn direction(&self) -> Result<Direction, GpioError>;
    fn set_direction_input(&self) -> Result<(), GpioError>;
    fn set_direction_output(&self, value: bool) -> Result<(), GpioError>;
    fn value(&self) -> Result<bool, GpioError>;
    fn set_value(&self, value: bool) -> Result<(), GpioError>;
}

/// Hands out the line described by a descriptor child node.
pub trait GpioProvider: Send + Sync + Debug {
    fn request(&self, child: &Node, label: &str) -> Result<Arc<dyn GpioLine>, GpioError>;
}

/// Parse an integer the way the host parses attribute input with base 0:
/// `0x` prefix for hex, a leading `0` for octal, decimal otherwise.
pub fn parse_int(value: &str) -> DeviceResult<i64> {
    let s = value.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(DeviceError::InvalidValue);
    }
    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| DeviceError::InvalidValue)?;
    Ok(if negative { -magnitude } else { magnitude })
}

#[derive(Debug)]
struct GpioAttributes {
    label: String,
    line: Arc<dyn GpioLine>,
}

impl AttributeSource for GpioAttributes {
    fn show(&self, attr: &str) -> DeviceResult<String> {
        match attr {
            ATTR_DIRECTION => Ok(match self.line.direction()? {
                Direction::Input => String::from("in"),
                Direction::Output => String::from("out"),
            }),
            ATTR_VALUE => Ok(format!("{}", self.line.value()? as u8)),
            ATTR_LABEL => Ok(self.label.clone()),
            _ => Err(DeviceError::NoSuchAttribute),
        }
    }

    fn store(&self, attr: &str, value: &str) -> DeviceResult<()> {
        match attr {
            ATTR_DIRECTION => match value.trim() {
                "in" => Ok(self.line.set_direction_input()?),
                "out" => Ok(self.line.set_direction_output(false)?),
                _ => Err(DeviceError::InvalidValue),
            },
            ATTR_VALUE => Ok(self.line.set_value(parse_int(value)? != 0)?),
            _ => Err(DeviceError::PermissionDenied),
        }
    }
}

/// Driver for `org,bone-gpio-sysfs` nodes.
#[derive(Debug)]
pub struct GpioSysfsDriver {
    provider: Arc<dyn GpioProvider>,
    attrs: Arc<AttributeExport>,
    bindings: Mutex<BTreeMap<u64, Vec<Box<str>>>>,
    next_binding: AtomicU64,
}

impl GpioSysfsDriver {
    pub fn new(provider: Arc<dyn GpioProvider>, attrs: Arc<AttributeExport>) -> GpioSysfsDriver {
        GpioSysfsDriver {
            provider,
            attrs,
            bindings: Mutex::new(BTreeMap::new()),
            next_binding: AtomicU64::new(0),
        }
    }

    /// Labels exported by `binding`.
    pub fn labels(&self, binding: Binding) -> Option<Vec<Box<str>>> {
        self.bindings.lock().get(&binding.0).cloned()
    }

    fn export_line(&self, pos: usize, child: &Node) -> DeviceResult<Box<str>> {
        let label = match child.property(PROP_LABEL).map(|prop| prop.value_as_str()) {
            Some(Ok(label)) => {
                info!("GPIO label = {}.", label);
                label.to_string()
            }
            _ => {
                warn!("Missing label on '{}'.", child.full_name);
                format!("unkn_gpio{}", pos)
            }
        };
        let line = self.provider.request(child, &label).inspect_err(|err| {
            if *err == GpioError::Unassigned {
                error!("No GPIO has been assigned to '{}'.", label);
            }
        })?;
        line.set_direction_output(false).inspect_err(|_| {
            error!("GPIO direction set failed on '{}'.", label);
        })?;
        let name: Box<str> = Box::from(label.as_str());
        self.attrs
            .export(&name, &GPIO_ATTRS, Arc::new(GpioAttributes { label, line }))?;
        Ok(name)
    }
}

impl Driver for GpioSysfsDriver {
    fn name(&self) -> &'static str {
        "bone-gpio-sysfs"
    }

    fn matches(&self, dev: &PlatformDevice<'_>) -> bool {
        dev.node().is_some_and(|node| node.is_compatible(GPIO_SYSFS_COMPAT))
    }

    fn probe(&self, dev: &PlatformDevice<'_>) -> DeviceResult<Binding> {
        let desc = dev.descriptor.ok_or(DeviceError::Unmatched)?;
        let children = desc.available_children();
        if children.is_empty() {
            error!("No child node found under '{}'.", dev.name);
            return Err(DeviceError::MalformedDescriptor {
                property: "children",
            });
        }
        info!("Total child nodes found = {}.", children.len());

        let mut labels: Vec<Box<str>> = Vec::new();
        for (pos, child) in children.into_iter().enumerate() {
            match self.export_line(pos, child) {
                Ok(label) => labels.push(label),
                Err(err) => {
                    for label in &labels {
                        self.attrs.unexport(label);
                    }
                    return Err(err);
                }
            }
        }

        let binding = self.next_binding.fetch_add(1, Ordering::AcqRel);
        self.bindings.lock().insert(binding, labels);
        Ok(Binding(binding))
    }

    fn remove(&self, binding: Binding) -> DeviceResult<()> {
        let labels = self
            .bindings
            .lock()
            .remove(&binding.0)
            .ok_or(DeviceError::NotFound)?;
        for label in &labels {
            self.attrs.unexport(label);
        }
        info!("Removed {} GPIO lines.", labels.len());
        Ok(())
    }
}
