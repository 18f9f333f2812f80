use byteorder::{ByteOrder,LittleEndian};

use super::{TagDescriptor, TAG_SIZE};
use crate::error::Result;
use crate::map::{AddressWindow, VirtualAddress};

const TAG_CLASS_OFFSET : usize = 0x0;
const TAG_PATH_OFFSET : usize = 0x10;
const TAG_BACKUP_OFFSET : usize = 0x1C;

#[derive(Debug,Clone,Copy,PartialEq)]
/// A tag array contains the tags that make up a Halo map.
///
/// This only remembers where the array is. The tags themselves are read from (and written to) the
/// cache file data on demand.
pub struct TagArray {
    offset : usize,
    count : usize
}
impl TagArray {
    /// Find the tag array of the tag data covered by `window`.
    ///
    /// The tag data header holds the address of the tag array at 0x0 and the tag count at 0xC.
    /// The whole array must be inside the window.
    pub fn locate(data : &[u8], window : &AddressWindow) -> Result<TagArray> {
        let tag_data = window.offset_of(window.base(), 0)?;
        let address = VirtualAddress(LittleEndian::read_u32(&data[tag_data + 0x0..]));
        let count = LittleEndian::read_u32(&data[tag_data + 0xC..]);
        let offset = window.offset_of(address, count as u64 * TAG_SIZE as u64)?;
        Ok(TagArray { offset, count : count as usize })
    }

    /// Number of tags in the array.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate through every tag. Each call starts a fresh pass from the first tag.
    pub fn tags<'a>(&self, data : &'a [u8]) -> Tags<'a> {
        Tags { array : *self, data, index : 0 }
    }

    /// Get a single tag, or `None` if `index` is past the end.
    pub fn get(&self, data : &[u8], index : usize) -> Option<TagDescriptor> {
        if index >= self.count {
            return None;
        }
        let tag = &data[self.tag_offset(index) .. self.tag_offset(index) + TAG_SIZE];
        Some(TagDescriptor {
            index,
            tag_class : LittleEndian::read_u32(&tag[TAG_CLASS_OFFSET..]),
            path_address : VirtualAddress(LittleEndian::read_u32(&tag[TAG_PATH_OFFSET..])),
            backup_address : VirtualAddress(LittleEndian::read_u32(&tag[TAG_BACKUP_OFFSET..]))
        })
    }

    /// Search for the first tag index in this tag array with a path and a class.
    ///
    /// Paths of tags with other classes are not read.
    pub fn find_tag(&self, data : &[u8], window : &AddressWindow, tag_path : &str, tag_class : u32) -> Result<Option<usize>> {
        for tag in self.tags(data) {
            if tag.tag_class == tag_class && tag.path(data, window)? == tag_path {
                return Ok(Some(tag.index));
            }
        }
        Ok(None)
    }

    /// Overwrite the path address of a tag.
    ///
    /// This function will panic if the tag does not exist.
    pub fn set_path_address(&self, data : &mut [u8], index : usize, address : VirtualAddress) {
        let offset = self.field_offset(index, TAG_PATH_OFFSET);
        LittleEndian::write_u32(&mut data[offset..], address.as_u32());
    }

    /// Overwrite the backup field of a tag.
    ///
    /// This function will panic if the tag does not exist.
    pub fn set_backup_address(&self, data : &mut [u8], index : usize, address : VirtualAddress) {
        let offset = self.field_offset(index, TAG_BACKUP_OFFSET);
        LittleEndian::write_u32(&mut data[offset..], address.as_u32());
    }

    fn tag_offset(&self, index : usize) -> usize {
        self.offset + index * TAG_SIZE
    }

    fn field_offset(&self, index : usize, field : usize) -> usize {
        assert!(index < self.count, "tag out of bounds");
        self.tag_offset(index) + field
    }
}

/// Iterator over the tags of a `TagArray`.
pub struct Tags<'a> {
    array : TagArray,
    data : &'a [u8],
    index : usize
}
impl<'a> Iterator for Tags<'a> {
    type Item = TagDescriptor;

    fn next(&mut self) -> Option<TagDescriptor> {
        let tag = self.array.get(self.data, self.index)?;
        self.index += 1;
        Some(tag)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.array.count - self.index;
        (remaining, Some(remaining))
    }
}
impl<'a> ExactSizeIterator for Tags<'a> {}
