//! Virtual addresses inside the tag data and the window they must fall within.
use std::fmt;

use encoding::{Encoding, DecoderTrap};
use encoding::all::ISO_8859_1;

use crate::error::{Error, Result};

/// Size of the tag data header. It precedes the tag array and is not part of the addressable
/// range reported by the tag data.
pub const TAG_DATA_HEADER_SIZE : u32 = 0x28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
/// A 32-bit address as stored in the tag data, relative to where Halo pretends to load it.
///
/// There is no way to turn one into a buffer index except through `AddressWindow::offset_of`.
pub struct VirtualAddress(pub u32);
impl VirtualAddress {
    /// The raw 32-bit value.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Step forward by `count` bytes, or `None` if that would wrap past `u32::MAX`.
    pub fn checked_add(self, count : u32) -> Option<VirtualAddress> {
        self.0.checked_add(count).map(VirtualAddress)
    }
}
impl fmt::Display for VirtualAddress {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Returns true if `len` bytes at `ptr` can be accessed in the window `[base, max)`.
///
/// The end is computed in 64 bits so a huge `len` cannot wrap back into range.
pub fn in_bounds(base : u32, max : u32, ptr : u32, len : u64) -> bool {
    ptr >= base && ptr <= max && (ptr as u64) + len < max as u64
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// The tag data block as seen by Halo: `base` is the virtual address of its first byte, `max`
/// the address one past its last byte, and `start` the offset of its first byte in the file.
pub struct AddressWindow {
    start : usize,
    base : u32,
    max : u32
}
impl AddressWindow {
    /// Build the window for tag data at `start` in the file with the given self-reported load
    /// address and length.
    ///
    /// The caller must make sure `start + length` does not exceed the buffer.
    pub fn new(start : usize, load_address : u32, length : u32) -> Result<AddressWindow> {
        let base = match load_address.checked_sub(TAG_DATA_HEADER_SIZE) {
            Some(n) => n,
            None => return Err(Error::OutOfBounds { address : load_address })
        };
        let max = match base.checked_add(length) {
            Some(n) => n,
            None => return Err(Error::OutOfBounds { address : load_address })
        };
        Ok(AddressWindow { start, base, max })
    }

    /// Virtual address of the first byte of the tag data.
    pub fn base(&self) -> VirtualAddress {
        VirtualAddress(self.base)
    }

    /// Virtual address one past the last byte of the tag data.
    pub fn max(&self) -> VirtualAddress {
        VirtualAddress(self.max)
    }

    /// Check whether `len` bytes at `address` are inside the window.
    pub fn contains(&self, address : VirtualAddress, len : u64) -> bool {
        in_bounds(self.base, self.max, address.0, len)
    }

    /// Translate `address` into an offset in the cache file after checking that `len` bytes
    /// starting there are in bounds.
    pub fn offset_of(&self, address : VirtualAddress, len : u64) -> Result<usize> {
        if !self.contains(address, len) {
            return Err(Error::OutOfBounds { address : address.0 });
        }
        Ok(self.translate(address))
    }

    // Only valid once `contains` has said yes.
    fn translate(&self, address : VirtualAddress) -> usize {
        self.start + (address.0 - self.base) as usize
    }

    /// Read the NUL-terminated string at `address`.
    ///
    /// Every byte, terminator included, is bounds checked before it is read. Returns the string
    /// and the address of its terminator.
    pub fn read_cstring(&self, data : &[u8], address : VirtualAddress) -> Result<(String, VirtualAddress)> {
        let start = self.offset_of(address, 1)?;
        let mut cursor = address;
        loop {
            let offset = self.offset_of(cursor, 1)?;
            let byte = match data.get(offset) {
                Some(n) => *n,
                None => return Err(Error::OutOfBounds { address : cursor.0 })
            };
            if byte == 0 {
                let string = match ISO_8859_1.decode(&data[start..offset], DecoderTrap::Strict) {
                    Ok(n) => n,
                    Err(_) => return Err(Error::OutOfBounds { address : address.0 })
                };
                return Ok((string, cursor));
            }
            cursor = match cursor.checked_add(1) {
                Some(n) => n,
                None => return Err(Error::OutOfBounds { address : cursor.0 })
            };
        }
    }
}
