//! Errors produced while reading, validating, patching and writing cache files.
use std::path::PathBuf;

use thiserror::Error;

use crate::map::{Game, MapType};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open {path}: {source}")]
    FileOpen {
        path : PathBuf,
        #[source]
        source : std::io::Error
    },

    #[error("failed to allocate {size} bytes")]
    Allocation { size : u64 },

    #[error("invalid cache file header")]
    InvalidHeader,

    #[error("not a MCC CEA cache file ({0}); this will not work on non-MCC CEA maps")]
    UnsupportedGame(Game),

    #[error("not a multiplayer map ({0}); this should only be used on multiplayer maps")]
    NotMultiplayer(MapType),

    #[error("not enough tag data to be a valid cache file ({0} bytes)")]
    TagDataTooSmall(u32),

    #[error("tag data ({length} bytes at {offset:#X}) extends past the end of the file")]
    TagDataOutOfRange { offset : u32, length : u32 },

    #[error("failed to translate {address:08X} to an offset - out of bounds")]
    OutOfBounds { address : u32 },

    #[error("already patched; use 'undo' to undo")]
    AlreadyPatched,

    #[error("not patched; use 'patch' to patch")]
    NotPatched,

    #[error("tag {path} has been modified by a tool that wasn't this one")]
    ForeignModification { path : String },

    #[error("no tag {path}.weapon was found")]
    ReferenceNotFound { path : String },

    #[error("failed to write {path}: {source}")]
    Write {
        path : PathBuf,
        #[source]
        source : std::io::Error
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error was raised before the file contents were touched, i.e. whether it came
    /// from the file system rather than from the cache file itself.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::FileOpen { .. } | Error::Allocation { .. } | Error::Write { .. })
    }
}
