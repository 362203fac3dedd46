use alloc::{boxed::Box, vec, vec::Vec};
use core::str;
use utils::endian::{BigEndian32, EndianData};

/// A named property of a descriptor node. The value is kept as the raw
/// big-endian byte string a flattened tree would carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: Box<str>,
    pub data: Box<[u8]>,
}

// region: constructors

impl Property {
    pub fn new(name: impl AsRef<str>, data: impl Into<Box<[u8]>>) -> Property {
        Property {
            name: Box::from(name.as_ref()),
            data: data.into(),
        }
    }

    /// A property with no value, e.g. `interrupt-controller;`.
    pub fn empty(name: impl AsRef<str>) -> Property {
        Property::new(name, Vec::<u8>::new())
    }

    /// A single big-endian cell.
    pub fn from_u32(name: impl AsRef<str>, value: u32) -> Property {
        Property::new(name, BigEndian32::from_value(value).to_bytes().to_vec())
    }

    /// A NUL-terminated string.
    pub fn from_string(name: impl AsRef<str>, value: &str) -> Property {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        Property::new(name, data)
    }

    /// A list of NUL-terminated strings, as used by `compatible`.
    pub fn from_strlist(name: impl AsRef<str>, values: &[&str]) -> Property {
        let mut data = vec![];
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        Property::new(name, data)
    }
}

// endregion

impl Property {
    pub fn value_as_u32(&self) -> Result<u32, PropertyError> {
        if self.data.len() != size_of::<u32>() {
            return Err(PropertyError::InvalidPropFormat);
        }
        BigEndian32::from_bytes(&self.data)
            .map(|cell| cell.value())
            .ok_or(PropertyError::InvalidPropFormat)
    }
    pub fn value_as_str(&self) -> Result<&str, PropertyError> {
        let raw = match self.data.iter().position(|b| *b == 0) {
            Some(end) => &self.data[..end],
            None => &self.data[..],
        };
        str::from_utf8(raw).map_err(|_| PropertyError::InvalidPropFormat)
    }
    pub fn value_as_strlist(&self) -> Result<Vec<&str>, PropertyError> {
        let mut res = vec![];
        for chunk in self.data.split(|b| *b == 0) {
            if chunk.is_empty() {
                continue;
            }
            res.push(str::from_utf8(chunk).map_err(|_| PropertyError::InvalidPropFormat)?);
        }
        Ok(res)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    InvalidPropFormat,
    PropNotFound,
}
