//! Module for handling tags in the tag array

mod tag_array;
pub use self::tag_array::*;

use crate::error::Result;
use crate::map::{AddressWindow, VirtualAddress};

/// Size of one entry in the tag array.
pub const TAG_SIZE : usize = 0x20;

/// `weap` (weapons)
pub const WEAP : u32 = 0x77656170;

/// Spell out a tag class as its four characters, e.g. `weap`.
pub fn class_name(tag_class : u32) -> String {
    tag_class.to_be_bytes().iter().map(|&c| if c.is_ascii_graphic() || c == b' ' { c as char } else { '?' }).collect()
}

#[derive(Debug,Clone,Copy,PartialEq)]
/// A copy of one entry in the tag array.
///
/// The addresses are exactly as stored in the file and have not been checked yet.
pub struct TagDescriptor {
    /// Position of the tag in the tag array.
    pub index : usize,

    /// Primary tag class, used by the engine to tell what kind of a tag this is.
    pub tag_class : u32,

    /// Address of the tag path.
    pub path_address : VirtualAddress,

    /// Address of the original tag path saved by a previous patch, or 0 if there is none.
    pub backup_address : VirtualAddress
}
impl TagDescriptor {
    /// Returns true if the tag is a weapon.
    pub fn is_weapon(&self) -> bool {
        self.tag_class == WEAP
    }

    /// Returns true if a previous patch left something in the backup field.
    pub fn has_backup(&self) -> bool {
        self.backup_address.as_u32() != 0
    }

    /// Read the tag path, checking the address and every byte of the string.
    pub fn path(&self, data : &[u8], window : &AddressWindow) -> Result<String> {
        window.read_cstring(data, self.path_address).map(|(path, _)| path)
    }

    /// Read the string the backup field points to, checking it the same way as the tag path.
    pub fn backup_path(&self, data : &[u8], window : &AddressWindow) -> Result<String> {
        window.read_cstring(data, self.backup_address).map(|(path, _)| path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names() {
        assert_eq!(class_name(WEAP), "weap");
        assert_eq!(class_name(0x736E6421), "snd!");
        assert_eq!(class_name(0x00000001), "????");
    }

    #[test]
    fn backup_flag() {
        let mut tag = TagDescriptor {
            index : 0,
            tag_class : WEAP,
            path_address : VirtualAddress(0x40440100),
            backup_address : VirtualAddress(0)
        };
        assert!(tag.is_weapon());
        assert!(!tag.has_backup());
        tag.backup_address = VirtualAddress(0x40440100);
        assert!(tag.has_backup());
    }
}
