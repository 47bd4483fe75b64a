// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Owned byte blobs with checked, position-independent record access.
//!
//! Manifests, process groups and buffer sets are flat byte arrays. Every
//! structure inside them is found by adding a stored relative offset to the
//! base of the structure that owns it, so copying the bytes anywhere and
//! wrapping them in a new [`Blob`] is a complete deserialization.
//!
//! Records are plain `#[repr(C)]` structs implementing [`bytemuck::Pod`].
//! Loads use unaligned reads, so the backing `Vec<u8>` needs no particular
//! alignment.

use crate::error::{Error, Result};
use bytemuck::Pod;
use std::{fmt, ops::Range};

/// Alignment of every record, trailing array and sub-blob.
pub const ALIGNMENT: usize = 8;

/// Round `size` up to the next multiple of [`ALIGNMENT`].
pub const fn align_up(size: usize) -> usize {
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Round `value` up to a multiple of `multiple`.
pub const fn ceil_mul(value: usize, multiple: usize) -> usize {
    if multiple == 0 {
        value
    } else {
        value.div_ceil(multiple) * multiple
    }
}

/// A serialized record with a declared bit size.
///
/// Implemented through [`records!`], which also asserts at compile time that
/// the declared size matches the Rust layout and is a multiple of
/// [`ALIGNMENT`].
pub trait Record: Pod {
    const SIZE_BITS: usize;
    const SIZE: usize = Self::SIZE_BITS / 8;
}

/// Declare the serialized bit size of one or more record types.
macro_rules! records {
    ($($ty:ty => $bits:expr),* $(,)?) => {
        $(
            impl $crate::blob::Record for $ty {
                const SIZE_BITS: usize = $bits;
            }

            const _: () = assert!(
                ::std::mem::size_of::<$ty>() * 8 == <$ty as $crate::blob::Record>::SIZE_BITS
                    && ::std::mem::size_of::<$ty>() % $crate::blob::ALIGNMENT == 0
            );
        )*
    };
}
pub(crate) use records;

/// Narrow a byte count into a `u16` field.
pub(crate) fn to_u16(what: &'static str, size: usize) -> Result<u16> {
    u16::try_from(size).map_err(|_| Error::Overflow {
        what,
        size,
        limit: u16::MAX as usize,
    })
}

/// Narrow a byte count into a `u32` field.
pub(crate) fn to_u32(what: &'static str, size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| Error::Overflow {
        what,
        size,
        limit: u32::MAX as usize,
    })
}

/// Narrow a count into a `u8` field.
pub(crate) fn to_u8(what: &'static str, size: usize) -> Result<u8> {
    u8::try_from(size).map_err(|_| Error::Overflow {
        what,
        size,
        limit: u8::MAX as usize,
    })
}

/// Owned, relocatable byte blob.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Blob {
    bytes: Vec<u8>,
}

impl Blob {
    /// Allocate `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn range(&self, offset: usize, size: usize) -> Result<Range<usize>> {
        match offset.checked_add(size) {
            Some(end) if end <= self.bytes.len() => Ok(offset..end),
            _ => Err(Error::OutOfBounds {
                offset,
                size,
                len: self.bytes.len(),
            }),
        }
    }

    /// Read a record at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the record would cross the end of the
    /// blob.
    pub fn load<T: Pod>(&self, offset: usize) -> Result<T> {
        let range = self.range(offset, std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(&self.bytes[range]))
    }

    /// Write a record at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the record would cross the end of the
    /// blob.
    pub fn store<T: Pod>(&mut self, offset: usize, value: &T) -> Result<()> {
        let range = self.range(offset, std::mem::size_of::<T>())?;
        self.bytes[range].copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }

    /// Read `count` consecutive records starting at `offset`.
    pub fn load_slice<T: Pod>(&self, offset: usize, count: usize) -> Result<Vec<T>> {
        let size = std::mem::size_of::<T>();
        let range = self.range(offset, size.saturating_mul(count))?;
        Ok(self.bytes[range]
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Write consecutive records starting at `offset`.
    pub fn store_slice<T: Pod>(&mut self, offset: usize, values: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let range = self.range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read-modify-write of the record at `offset`.
    pub fn update<T: Pod, R>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut value = self.load::<T>(offset)?;
        let ret = f(&mut value);
        self.store(offset, &value)?;
        Ok(ret)
    }

    /// Borrow `size` raw bytes at `offset`.
    pub fn bytes(&self, offset: usize, size: usize) -> Result<&[u8]> {
        let range = self.range(offset, size)?;
        Ok(&self.bytes[range])
    }

    /// Mutably borrow `size` raw bytes at `offset`.
    pub fn bytes_mut(&mut self, offset: usize, size: usize) -> Result<&mut [u8]> {
        let range = self.range(offset, size)?;
        Ok(&mut self.bytes[range])
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.bytes.len())
    }
}
