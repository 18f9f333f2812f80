//! Module for patching weapon hit detection
//!
//! Patching points the path of every weapon tag at the path of the pistol, which makes the game
//! use the pistol's client-side hit detection for all of them. The original path address of each
//! weapon is kept in an unused field of its tag array entry (0x1C) so that the patch can be undone.
//!
//! Both operations go through the tag array in three passes:
//!
//! 1. Discovery reads the path of every tag, whatever its class, and remembers where the pistol's
//!    path is.
//! 2. Validation goes through the weapons again, checks that the operation makes sense for each
//!    of them, and plans the writes.
//! 3. Mutation carries out the planned writes.
//!
//! Nothing is written until validation has passed for every weapon, so a failure leaves the data
//! exactly as it was.
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::map::{AddressWindow, CacheFile, CacheHeader, VirtualAddress};
use crate::tag::{class_name, TagArray, TagDescriptor, WEAP};

/// Path of the weapon whose hit detection every other weapon is given.
pub const REFERENCE_PATH : &str = "weapons\\pistol\\pistol";

/// Paths of weapons that are never touched.
pub const IGNORED_PATHS : &[&str] = &["weapons\\sniper rifle\\sniper rifle"];

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
/// What to do to the cache file.
pub enum Operation {
    /// Redirect every weapon to the reference weapon.
    Apply,

    /// Restore every weapon's original path.
    Revert
}

#[derive(Debug,Clone,PartialEq)]
/// Which tags are patched, and what they are patched to.
pub struct PatchConfig {
    /// Path of the weapon every other weapon is redirected to.
    pub reference_path : String,

    /// Weapons with these paths are left alone.
    pub ignored_paths : Vec<String>,

    /// Tag class of the tags being patched.
    pub weapon_class : u32
}
impl Default for PatchConfig {
    fn default() -> PatchConfig {
        PatchConfig {
            reference_path : REFERENCE_PATH.to_owned(),
            ignored_paths : IGNORED_PATHS.iter().map(|p| p.to_string()).collect(),
            weapon_class : WEAP
        }
    }
}
impl PatchConfig {
    /// Returns true if tags with this path must not be touched.
    pub fn is_ignored(&self, path : &str) -> bool {
        self.ignored_paths.iter().any(|p| p == path)
    }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,PartialOrd,Ord)]
/// How far a patch has gotten.
///
/// Stages only move forward. Any failed check moves to `Failed`, and `Written` can only follow
/// `MutationComplete`.
pub enum Stage {
    Start,

    /// The cache file header passed its checks.
    HeaderValidated,

    /// Every tag path was read and the reference weapon was looked for.
    DiscoveryComplete,

    /// Every weapon was checked and the writes were planned.
    ValidationComplete,

    /// The planned writes were made in memory.
    MutationComplete,

    /// The cache file was written back to disk.
    Written,

    /// A check failed or the cache file could not be written. Nothing was written to disk.
    Failed
}

#[derive(Debug,Clone,PartialEq)]
/// The outcome of a successful patch.
pub struct PatchReport {
    /// Whether the patch was applied or reverted.
    pub operation : Operation,

    /// Address of the reference weapon's path, if there is one.
    pub reference_address : Option<VirtualAddress>,

    /// Number of tags that were changed.
    pub modified : usize,

    /// Number of weapons that were skipped because their path is ignored.
    pub ignored : usize,

    /// `MutationComplete` if only the data in memory was patched, `Written` once it is on disk.
    pub stage : Stage
}

// A write planned by the validation pass.
#[derive(Debug,Clone,Copy)]
struct Edit {
    index : usize,
    path_address : VirtualAddress,
    backup_address : VirtualAddress
}

// The first weapon with the reference path.
#[derive(Debug,Clone,Copy)]
struct Reference {
    index : usize,
    path_address : VirtualAddress
}

// What the discovery pass found.
#[derive(Debug,Clone,Copy)]
struct Discovery {
    reference : Option<Reference>,
    ignored : usize
}

/// Applies or reverts the patch on the tag data of one cache file.
pub struct Patcher<'a> {
    config : &'a PatchConfig,
    header : CacheHeader,
    stage : Stage
}
impl<'a> Patcher<'a> {
    /// Create a patcher for a cache file.
    ///
    /// A `CacheFile` only exists once its header has passed `CacheHeader::from_cache_file`, so the
    /// patcher starts out at `HeaderValidated`.
    pub fn new(cache_file : &CacheFile, config : &'a PatchConfig) -> Patcher<'a> {
        let mut patcher = Patcher { config, header : cache_file.header().clone(), stage : Stage::Start };
        patcher.advance(Stage::HeaderValidated);
        patcher
    }

    /// How far the patch has gotten.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run all three passes over `data`, which must be the data of the cache file this patcher
    /// was created for.
    ///
    /// A patcher runs once. If any pass fails, the patcher moves to `Failed` and `data` is left
    /// as it was.
    pub fn run(&mut self, data : &mut [u8], operation : Operation) -> Result<PatchReport> {
        debug_assert_eq!(self.stage, Stage::HeaderValidated, "a patcher runs once");
        let result = self.run_passes(data, operation);
        if let Err(ref e) = result {
            self.fail(e);
        }
        result
    }

    fn run_passes(&mut self, data : &mut [u8], operation : Operation) -> Result<PatchReport> {
        let window = self.header.address_window(data)?;
        let tag_array = TagArray::locate(data, &window)?;
        debug!(
            "tag data spans {}-{}, {} tags",
            window.base(), window.max(), tag_array.len()
        );
        let passes = Passes { config : self.config, window : &window, tag_array };

        let discovery = passes.discover(data)?;
        self.advance(Stage::DiscoveryComplete);

        let edits = match operation {
            Operation::Apply => {
                let reference = match discovery.reference {
                    Some(n) => n,
                    None => return Err(Error::ReferenceNotFound { path : self.config.reference_path.clone() })
                };
                passes.validate_apply(data, reference)?
            },
            Operation::Revert => passes.validate_revert(data)?
        };
        self.advance(Stage::ValidationComplete);

        passes.mutate(data, &edits);
        self.advance(Stage::MutationComplete);

        Ok(PatchReport {
            operation,
            reference_address : discovery.reference.map(|r| r.path_address),
            modified : edits.len(),
            ignored : discovery.ignored,
            stage : self.stage
        })
    }

    /// Mark the patched data as written back to disk.
    ///
    /// Panics if the passes have not all completed.
    pub fn finish(&mut self, report : &mut PatchReport) {
        assert_eq!(self.stage, Stage::MutationComplete, "only patched data can be written");
        self.advance(Stage::Written);
        report.stage = self.stage;
    }

    fn advance(&mut self, stage : Stage) {
        debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn fail(&mut self, error : &Error) {
        debug!("failed after {:?}: {}", self.stage, error);
        self.stage = Stage::Failed;
    }
}

// The three passes over the tag array of one cache file.
struct Passes<'a> {
    config : &'a PatchConfig,
    window : &'a AddressWindow,
    tag_array : TagArray
}
impl<'a> Passes<'a> {
    // Read every tag path. This checks that all of them are valid and finds the reference weapon.
    fn discover(&self, data : &[u8]) -> Result<Discovery> {
        let mut discovery = Discovery { reference : None, ignored : 0 };
        for tag in self.tag_array.tags(data) {
            let path = tag.path(data, self.window)?;
            trace!("tag #{} {}.{} at {}", tag.index, path, class_name(tag.tag_class), tag.path_address);

            if tag.tag_class != self.config.weapon_class {
                continue;
            }
            if self.config.is_ignored(&path) {
                discovery.ignored += 1;
            }
            else if discovery.reference.is_none() && path == self.config.reference_path {
                debug!("found {} at {}", path, tag.path_address);
                discovery.reference = Some(Reference { index : tag.index, path_address : tag.path_address });
            }
        }
        Ok(discovery)
    }

    // Read the path of a weapon that is not ignored, or return `None` for any other tag.
    fn weapon_path(&self, data : &[u8], tag : &TagDescriptor) -> Result<Option<String>> {
        if tag.tag_class != self.config.weapon_class {
            return Ok(None);
        }
        let path = tag.path(data, self.window)?;
        if self.config.is_ignored(&path) {
            return Ok(None);
        }
        Ok(Some(path))
    }

    fn validate_apply(&self, data : &[u8], reference : Reference) -> Result<Vec<Edit>> {
        let mut edits = Vec::new();
        for tag in self.tag_array.tags(data) {
            let path = match self.weapon_path(data, &tag)? {
                Some(n) => n,
                None => continue
            };

            // Only one weapon has the reference path until it is patched, and the backup field is
            // only ever set by patching.
            if path == self.config.reference_path && (tag.index != reference.index || tag.has_backup()) {
                return Err(Error::AlreadyPatched);
            }
            if tag.has_backup() {
                return Err(Error::ForeignModification { path });
            }

            edits.push(Edit {
                index : tag.index,
                path_address : reference.path_address,
                backup_address : tag.path_address
            });
        }
        Ok(edits)
    }

    fn validate_revert(&self, data : &[u8]) -> Result<Vec<Edit>> {
        let mut edits = Vec::new();
        for tag in self.tag_array.tags(data) {
            let path = match self.weapon_path(data, &tag)? {
                Some(n) => n,
                None => continue
            };

            // Patched weapons all have the reference path and a backup address.
            if path != self.config.reference_path || !self.window.contains(tag.backup_address, 1) {
                return Err(Error::NotPatched);
            }
            let original = tag.backup_path(data, self.window)?;
            trace!("tag #{} reverts to {}", tag.index, original);

            edits.push(Edit {
                index : tag.index,
                path_address : tag.backup_address,
                backup_address : VirtualAddress(0)
            });
        }
        if edits.is_empty() {
            return Err(Error::NotPatched);
        }
        Ok(edits)
    }

    fn mutate(&self, data : &mut [u8], edits : &[Edit]) {
        for edit in edits {
            self.tag_array.set_backup_address(data, edit.index, edit.backup_address);
            self.tag_array.set_path_address(data, edit.index, edit.path_address);
        }
    }
}

impl CacheFile {
    /// Apply or revert the patch on this cache file in memory.
    pub fn patch(&mut self, operation : Operation, config : &PatchConfig) -> Result<PatchReport> {
        Patcher::new(self, config).run(self.data_mut(), operation)
    }
}

/// Apply or revert the patch on the cache file at `path`, writing it back if successful.
///
/// The file is left untouched on failure.
pub fn patch_map_file(path : &Path, operation : Operation, config : &PatchConfig) -> Result<PatchReport> {
    let mut cache_file = CacheFile::open(path)?;
    let mut patcher = Patcher::new(&cache_file, config);
    let mut report = patcher.run(cache_file.data_mut(), operation)?;
    if let Err(e) = cache_file.save(path) {
        patcher.fail(&e);
        return Err(e);
    }
    patcher.finish(&mut report);
    Ok(report)
}
