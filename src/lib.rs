//! This crate patches Halo: Combat Evolved Anniversary (MCC) multiplayer cache files so that every
//! weapon uses the client-side hit detection of the pistol, and undoes that patch.
//!
//! ```no_run
//! use std::path::Path;
//! use hitreg_patcher::{patch_map_file, Operation, PatchConfig};
//!
//! let report = patch_map_file(Path::new("bloodgulch.map"), Operation::Apply, &PatchConfig::default())?;
//! println!("{} weapons patched", report.modified);
//! # Ok::<(), hitreg_patcher::Error>(())
//! ```
pub mod error;
pub mod map;
pub mod patch;
pub mod tag;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use map::{CacheFile, CacheHeader, VirtualAddress};
pub use patch::{patch_map_file, Operation, PatchConfig, PatchReport, Patcher, Stage};
