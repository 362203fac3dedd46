//! ## Endianness Module
//! This module provides some structs to better resolve the data in specific endianness rules
//!
//! All the types declared here implements [EndianData<T>],
//! which defines [EndianData<T>::value] function to parse the data into the
//! endianness of the current arch.
//! Descriptor property cells are always stored as big endian `u32`s, so only
//! that type is provided.

///[u32] in Big Endianness
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigEndian32(u32);

/// This trait defines a packed data in memory with some specific endianness.
pub trait EndianData<T>: Copy + Clone {
    /// Parse the value into the endianness of the current architecture.
    fn value(&self) -> T;
    /// Pack a native value into this endianness.
    fn from_value(value: T) -> Self;
    /// Reinterpret raw bytes as stored data, `None` if `bytes` is too short.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;
}

/// Implement an [EndianData<T>] for a specific type, and explain the data in big endianess
macro_rules! impl_converter_big {
    ($type: tt, $tval: tt) => {
        impl EndianData<$tval> for $type {
            #[inline(always)]
            fn value(&self) -> $tval {
                $tval::from_be(self.0)
            }

            #[inline(always)]
            fn from_value(value: $tval) -> Self {
                $type(value.to_be())
            }

            fn from_bytes(bytes: &[u8]) -> Option<Self> {
                const WIDTH: usize = size_of::<$tval>();
                let raw: [u8; WIDTH] = bytes.get(..WIDTH)?.try_into().ok()?;
                // keep the stored byte order, `value` does the swap
                Some($type($tval::from_ne_bytes(raw)))
            }
        }

        impl $type {
            /// Raw stored bytes, most significant first.
            pub fn to_bytes(self) -> [u8; size_of::<$tval>()] {
                self.0.to_ne_bytes()
            }
        }
    };
}

impl_converter_big!(BigEndian32, u32);
