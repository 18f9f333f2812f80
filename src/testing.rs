//! Builds small synthetic MCC CEA multiplayer cache files for tests.
//!
//! Layout: a 0x800 byte header, then the tag data. The tag data starts with its 0x28 byte header,
//! followed by the tag array, the tag paths, and a few bytes of padding.
#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};

/// Virtual address of the first byte of the tag data.
pub const BASE_ADDRESS : u32 = 0x40440000;

/// File offset of the tag data.
pub const TAG_DATA_OFFSET : usize = 0x800;

/// File offset of the tag array.
pub const TAG_ARRAY_OFFSET : usize = TAG_DATA_OFFSET + 0x28;

pub const WEAP : u32 = 0x77656170;
pub const BITM : u32 = 0x6269746D;

pub const PISTOL : &str = "weapons\\pistol\\pistol";
pub const SNIPER_RIFLE : &str = "weapons\\sniper rifle\\sniper rifle";
pub const ASSAULT_RIFLE : &str = "weapons\\assault rifle\\assault rifle";

struct BuilderTag {
    class : u32,
    path : String,
    backup : Option<String>
}

pub struct CacheFileBuilder {
    tags : Vec<BuilderTag>,
    tag_count : Option<u32>,
    padding : usize
}
impl CacheFileBuilder {
    pub fn new() -> CacheFileBuilder {
        CacheFileBuilder { tags : Vec::new(), tag_count : None, padding : 0x10 }
    }

    pub fn tag(mut self, class : u32, path : &str) -> CacheFileBuilder {
        self.tags.push(BuilderTag { class, path : path.to_owned(), backup : None });
        self
    }

    /// Add a tag whose backup field points at a separate string holding `backup`.
    pub fn tag_with_backup(mut self, class : u32, path : &str, backup : &str) -> CacheFileBuilder {
        self.tags.push(BuilderTag { class, path : path.to_owned(), backup : Some(backup.to_owned()) });
        self
    }

    /// Override the tag count written in the tag data header.
    pub fn tag_count(mut self, count : u32) -> CacheFileBuilder {
        self.tag_count = Some(count);
        self
    }

    /// Number of zero bytes after the last string.
    pub fn padding(mut self, padding : usize) -> CacheFileBuilder {
        self.padding = padding;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = vec![0u8; TAG_ARRAY_OFFSET + self.tags.len() * 0x20];

        for (i, tag) in self.tags.iter().enumerate() {
            let path_address = append_string(&mut data, &tag.path);
            let backup_address = match tag.backup {
                Some(ref n) => append_string(&mut data, n),
                None => 0
            };
            let entry = TAG_ARRAY_OFFSET + i * 0x20;
            LittleEndian::write_u32(&mut data[entry..], tag.class);
            LittleEndian::write_u32(&mut data[entry + 0x10..], path_address);
            LittleEndian::write_u32(&mut data[entry + 0x14..], BASE_ADDRESS + 0x28 + i as u32 * 0x20);
            LittleEndian::write_u32(&mut data[entry + 0x1C..], backup_address);
        }
        data.resize(data.len() + self.padding, 0);

        let tag_data_length = (data.len() - TAG_DATA_OFFSET) as u32;

        // Header
        LittleEndian::write_u32(&mut data[0x0..], 0x68656164);
        LittleEndian::write_u32(&mut data[0x4..], 13);
        let file_size = data.len() as u32;
        LittleEndian::write_u32(&mut data[0x8..], file_size);
        LittleEndian::write_u32(&mut data[0x10..], TAG_DATA_OFFSET as u32);
        LittleEndian::write_u32(&mut data[0x14..], tag_data_length);
        data[0x20..0x2A].copy_from_slice(b"bloodgulch");
        data[0x40..0x4D].copy_from_slice(b"01.00.00.0609");
        LittleEndian::write_u32(&mut data[0x60..], 1);
        LittleEndian::write_u32(&mut data[0x7FC..], 0x666F6F74);

        // Tag data header
        LittleEndian::write_u32(&mut data[TAG_DATA_OFFSET..], BASE_ADDRESS + 0x28);
        LittleEndian::write_u32(&mut data[TAG_DATA_OFFSET + 0xC..], self.tag_count.unwrap_or(self.tags.len() as u32));
        data[TAG_DATA_OFFSET + 0x24..TAG_DATA_OFFSET + 0x28].copy_from_slice(b"sgat");

        data
    }
}

fn append_string(data : &mut Vec<u8>, string : &str) -> u32 {
    let address = BASE_ADDRESS + (data.len() - TAG_DATA_OFFSET) as u32;
    data.extend_from_slice(string.as_bytes());
    data.push(0);
    address
}

/// Read a 32-bit field of a tag in a built cache file.
pub fn tag_field(data : &[u8], index : usize, field : usize) -> u32 {
    LittleEndian::read_u32(&data[TAG_ARRAY_OFFSET + index * 0x20 + field..])
}

/// Write a 32-bit field of a tag in a built cache file.
pub fn set_tag_field(data : &mut [u8], index : usize, field : usize, value : u32) {
    LittleEndian::write_u32(&mut data[TAG_ARRAY_OFFSET + index * 0x20 + field..], value);
}

/// Path address of a tag in a built cache file.
pub fn path_address(data : &[u8], index : usize) -> u32 {
    tag_field(data, index, 0x10)
}

/// Backup field of a tag in a built cache file.
pub fn backup_address(data : &[u8], index : usize) -> u32 {
    tag_field(data, index, 0x1C)
}

/// File offset of a virtual address in a built cache file.
pub fn file_offset(address : u32) -> usize {
    TAG_DATA_OFFSET + (address - BASE_ADDRESS) as usize
}
