//! Module for handling cache files
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use encoding::{Encoding, DecoderTrap};
use encoding::all::ISO_8859_1;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};

mod address;
pub use self::address::*;

/// A cache file header is 2048 bytes.
pub const CACHE_HEADER_SIZE : usize = 0x800;

/// `head` as stored at the beginning of the header.
pub const HEAD_MAGIC : u32 = 0x68656164;

/// `foot` as stored at the end of the header.
pub const FOOT_MAGIC : u32 = 0x666F6F74;

#[derive(Debug,PartialEq,Clone)]
/// Engine version stored at 0x4 of the header. Only MCC CEA maps are patched; the other known
/// versions are recognized so they can be named when a map is refused.
pub enum Game {
    /// Retail Halo PC maps.
    HaloCombatEvolved,

    /// Halo Custom Edition maps. These look the most like MCC CEA maps and are the most likely to
    /// be passed in by mistake.
    HaloCustomEdition,

    /// The Combat Evolved Anniversary build shipped in the Master Chief Collection. Its maps use
    /// the Custom Edition layout with a different version number, and are the only maps this
    /// crate patches.
    MccCustomEditionAnniversary,

    /// Other iterations of the engine use different version numbers.
    Unknown(u32)
}
impl Game {
    /// Convert a 32-bit unsigned integer into a Game.
    pub fn from_u32(map_game : u32) -> Game {
        match map_game {
            0x7 => Game::HaloCombatEvolved,
            0xD => Game::MccCustomEditionAnniversary,
            0x261 => Game::HaloCustomEdition,
            n => Game::Unknown(n)
        }
    }

    /// Convert a Game to its equivalent 32-bit integer.
    pub fn as_u32(&self) -> u32 {
        match *self {
            Game::HaloCombatEvolved => 0x7,
            Game::MccCustomEditionAnniversary => 0xD,
            Game::HaloCustomEdition => 0x261,
            Game::Unknown(n) => n
        }
    }
}
impl fmt::Display for Game {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Game::HaloCombatEvolved => f.write_str("Halo: Combat Evolved"),
            Game::HaloCustomEdition => f.write_str("Halo Custom Edition"),
            Game::MccCustomEditionAnniversary => f.write_str("MCC CEA"),
            Game::Unknown(n) => write!(f, "unknown engine version {}", n)
        }
    }
}

#[derive(Debug,PartialEq,Clone)]
/// Map type stored at 0x60 of the header. Only multiplayer maps have weapons worth patching.
pub enum MapType {
    Multiplayer,

    /// Campaign maps.
    Singleplayer,

    /// ui.map, the main menu.
    UserInterface,

    /// Other map types may use different numbers.
    Unknown(u32)
}
impl MapType {
    /// Convert a 32-bit unsigned integer into a MapType.
    pub fn from_u32(map_type : u32) -> MapType {
        match map_type {
            0x0 => MapType::Singleplayer,
            0x1 => MapType::Multiplayer,
            0x2 => MapType::UserInterface,
            n => MapType::Unknown(n)
        }
    }

    /// Convert a MapType to its equivalent 32-bit integer.
    pub fn as_u32(&self) -> u32 {
        match *self {
            MapType::Singleplayer => 0x0,
            MapType::Multiplayer => 0x1,
            MapType::UserInterface => 0x2,
            MapType::Unknown(n) => n
        }
    }
}
impl fmt::Display for MapType {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MapType::Multiplayer => f.write_str("multiplayer"),
            MapType::Singleplayer => f.write_str("singleplayer"),
            MapType::UserInterface => f.write_str("user interface"),
            MapType::Unknown(n) => write!(f, "unknown map type {}", n)
        }
    }
}

#[derive(Debug,Clone)]
/// The parts of the cache file header needed to find the tag data.
pub struct CacheHeader {
    /// This determines the game the map was built for.
    pub game : Game,

    /// This determines whether the map is singleplayer, multiplayer or a user interface.
    pub map_type : MapType,

    /// This is the name of the map. It is only used for diagnostics.
    pub name : Option<String>,

    /// This is the build string of the map. It is only used for diagnostics.
    pub build : Option<String>,

    /// Offset of the tag data in the file.
    pub tag_data_offset : u32,

    /// Length of the tag data in bytes.
    pub tag_data_length : u32
}
impl CacheHeader {
    /// This function attempts to parse and validate the header of a cache file.
    ///
    /// Only MCC CEA multiplayer maps with tag data that fits in the file are accepted.
    pub fn from_cache_file(cache_file : &[u8]) -> Result<CacheHeader> {
        if cache_file.len() < CACHE_HEADER_SIZE {
            return Err(Error::InvalidHeader);
        }

        // Check the "head" and "foot" markers in the beginning and ending of header, respectively.
        if LittleEndian::read_u32(&cache_file[0x0..]) != HEAD_MAGIC || LittleEndian::read_u32(&cache_file[0x7FC..]) != FOOT_MAGIC {
            return Err(Error::InvalidHeader);
        }

        let game = Game::from_u32(LittleEndian::read_u32(&cache_file[0x4..]));
        if game != Game::MccCustomEditionAnniversary {
            return Err(Error::UnsupportedGame(game));
        }

        let map_type = MapType::from_u32(LittleEndian::read_u32(&cache_file[0x60..]));
        if map_type != MapType::Multiplayer {
            return Err(Error::NotMultiplayer(map_type));
        }

        let tag_data_offset = LittleEndian::read_u32(&cache_file[0x10..]);
        let tag_data_length = LittleEndian::read_u32(&cache_file[0x14..]);
        if tag_data_length < TAG_DATA_HEADER_SIZE {
            return Err(Error::TagDataTooSmall(tag_data_length));
        }
        let tag_data_end = tag_data_offset as u64 + tag_data_length as u64;
        if tag_data_end > cache_file.len() as u64 {
            return Err(Error::TagDataOutOfRange { offset : tag_data_offset, length : tag_data_length });
        }

        Ok(CacheHeader {
            game,
            map_type,
            name : string_from_slice(&cache_file[0x20..0x40]).ok(),
            build : string_from_slice(&cache_file[0x40..0x60]).ok(),
            tag_data_offset,
            tag_data_length
        })
    }

    /// Build the address window of the tag data in `cache_file` from its self-reported load
    /// address, the first word of the tag data.
    ///
    /// `cache_file` must be the data this header was parsed from.
    pub fn address_window(&self, cache_file : &[u8]) -> Result<AddressWindow> {
        let start = self.tag_data_offset as usize;
        let load_address = LittleEndian::read_u32(&cache_file[start..]);
        AddressWindow::new(start, load_address, self.tag_data_length)
    }
}

#[derive(Debug)]
/// A validated cache file held entirely in memory.
pub struct CacheFile {
    header : CacheHeader,
    data : Vec<u8>
}
impl CacheFile {
    /// Validate the header of a cache file that is already in memory.
    pub fn from_vec(data : Vec<u8>) -> Result<CacheFile> {
        let header = CacheHeader::from_cache_file(&data)?;
        debug!(
            "cache file {:?} (build {:?}): {} bytes of tag data at {:#X}",
            header.name, header.build, header.tag_data_length, header.tag_data_offset
        );
        Ok(CacheFile { header, data })
    }

    /// Read and validate a cache file.
    pub fn open(path : &Path) -> Result<CacheFile> {
        let open_error = |source : std::io::Error| Error::FileOpen { path : path.to_owned(), source };

        let mut file = File::open(path).map_err(open_error)?;
        let size = file.metadata().map_err(open_error)?.len();

        let mut data = Vec::new();
        let capacity = match usize::try_from(size) {
            Ok(n) => n,
            Err(_) => return Err(Error::Allocation { size })
        };
        if data.try_reserve_exact(capacity).is_err() {
            return Err(Error::Allocation { size });
        }
        data.resize(capacity, 0);
        file.read_exact(&mut data).map_err(open_error)?;

        debug!("read {} bytes from {}", size, path.display());
        CacheFile::from_vec(data)
    }

    /// Write the cache file back to `path`.
    ///
    /// The data goes to a temporary file next to the file `path` refers to, which then replaces
    /// it, so a failed write leaves the original untouched. If `path` is a symlink, the file it
    /// points to is replaced and the link is kept. The permissions of the original are kept too.
    pub fn save(&self, path : &Path) -> Result<()> {
        let write_error = |source : std::io::Error| Error::Write { path : path.to_owned(), source };

        let target = match fs::canonicalize(path) {
            Ok(n) => n,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => path.to_owned(),
            Err(e) => return Err(write_error(e))
        };
        let permissions = match fs::metadata(&target) {
            Ok(n) => Some(n.permissions()),
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(write_error(e))
        };

        let directory = match target.parent() {
            Some(n) if !n.as_os_str().is_empty() => n,
            _ => Path::new(".")
        };
        let mut file = NamedTempFile::new_in(directory).map_err(write_error)?;
        file.write_all(&self.data).map_err(write_error)?;
        if let Some(permissions) = permissions {
            file.as_file().set_permissions(permissions).map_err(write_error)?;
        }
        file.as_file().sync_all().map_err(write_error)?;
        file.persist(&target).map_err(|e| write_error(e.error))?;

        info!("wrote {} bytes to {}", self.data.len(), target.display());
        Ok(())
    }

    /// Get the validated header.
    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    /// Get an immutable reference to the file contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the file contents.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the cache file, returning its contents.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Offset of the tag data in the file.
    pub fn tag_data_start(&self) -> usize {
        self.header.tag_data_offset as usize
    }

    /// Build the address window of the tag data from its self-reported load address.
    pub fn address_window(&self) -> Result<AddressWindow> {
        self.header.address_window(&self.data)
    }
}

// This function will create a string from an ISO 8859-1 string in a slice.
fn string_from_slice(slice : &[u8]) -> std::result::Result<String,&'static str> {
    match slice.iter().position(|&x| x == 0) {
        Some(n) => match ISO_8859_1.decode(&slice[..n], DecoderTrap::Strict) {
            Ok(n) => Ok(n),
            Err(_) => Err("invalid latin1 string")
        },
        None => Err("string had no null-termination")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CacheFileBuilder;

    #[test]
    fn parses_header() {
        let data = CacheFileBuilder::new().build();
        let cache_file = CacheFile::from_vec(data).unwrap();
        let header = cache_file.header();
        assert_eq!(header.game, Game::MccCustomEditionAnniversary);
        assert_eq!(header.map_type, MapType::Multiplayer);
        assert_eq!(header.name.as_deref(), Some("bloodgulch"));
        assert_eq!(header.build.as_deref(), Some("01.00.00.0609"));
        assert_eq!(header.tag_data_offset as usize, CACHE_HEADER_SIZE);
    }

    #[test]
    fn rejects_short_file() {
        assert!(matches!(CacheHeader::from_cache_file(&[0u8; 0x7FF]), Err(Error::InvalidHeader)));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = CacheFileBuilder::new().build();
        LittleEndian::write_u32(&mut data[0x7FC..], 0x746F6F66);
        assert!(matches!(CacheHeader::from_cache_file(&data), Err(Error::InvalidHeader)));

        let mut data = CacheFileBuilder::new().build();
        data[0..4].copy_from_slice(b"head");
        assert!(matches!(CacheHeader::from_cache_file(&data), Err(Error::InvalidHeader)));
    }

    #[test]
    fn rejects_other_games() {
        let mut data = CacheFileBuilder::new().build();
        LittleEndian::write_u32(&mut data[0x4..], Game::HaloCustomEdition.as_u32());
        assert!(matches!(CacheHeader::from_cache_file(&data), Err(Error::UnsupportedGame(Game::HaloCustomEdition))));
    }

    #[test]
    fn rejects_non_multiplayer() {
        let mut data = CacheFileBuilder::new().build();
        LittleEndian::write_u32(&mut data[0x60..], MapType::UserInterface.as_u32());
        assert!(matches!(CacheHeader::from_cache_file(&data), Err(Error::NotMultiplayer(MapType::UserInterface))));
    }

    #[test]
    fn rejects_small_tag_data() {
        let mut data = CacheFileBuilder::new().build();
        LittleEndian::write_u32(&mut data[0x14..], 0x27);
        assert!(matches!(CacheHeader::from_cache_file(&data), Err(Error::TagDataTooSmall(0x27))));
    }

    #[test]
    fn rejects_tag_data_past_end() {
        let mut data = CacheFileBuilder::new().build();
        let length = (data.len() - CACHE_HEADER_SIZE + 1) as u32;
        LittleEndian::write_u32(&mut data[0x14..], length);
        assert!(matches!(CacheHeader::from_cache_file(&data), Err(Error::TagDataOutOfRange { .. })));

        let mut data = CacheFileBuilder::new().build();
        LittleEndian::write_u32(&mut data[0x10..], 0xFFFFFFF0);
        assert!(matches!(CacheHeader::from_cache_file(&data), Err(Error::TagDataOutOfRange { .. })));
    }

    #[test]
    fn address_window_uses_load_address() {
        let cache_file = CacheFile::from_vec(CacheFileBuilder::new().build()).unwrap();
        let window = cache_file.address_window().unwrap();
        assert_eq!(window.base(), VirtualAddress(crate::testing::BASE_ADDRESS));
    }
}
