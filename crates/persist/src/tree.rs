//! Directory tree traversal, copy and removal.
//!
//! Only directories and regular files are considered. Symbolic links and
//! special files are never followed, copied or hashed; removal deletes the
//! link itself.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::StoreError;

/// Default suffix for runtime-only artifacts such as `session.lock`.
pub const DEFAULT_TRANSIENT_SUFFIX: &str = ".lock";

/// Rule for files that reflect runtime state rather than durable content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    suffix: String,
}

impl Exclusion {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Whether a file at `path` is skipped. An empty suffix excludes nothing.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.suffix.is_empty() {
            return false;
        }
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(&self.suffix))
    }
}

impl Default for Exclusion {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_SUFFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

/// One entry found by [`walk`].
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Path relative to the walked root.
    pub relative: PathBuf,
    pub kind: EntryKind,
}

/// Directories and non-excluded regular files under `root`, parents before
/// children, siblings sorted by name. The root itself is not listed.
pub fn walk(root: &Path, exclusion: &Exclusion) -> Result<Vec<TreeEntry>, StoreError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            if exclusion.is_excluded(entry.path()) {
                tracing::debug!(path = %entry.path().display(), "skipping transient file");
                continue;
            }
            EntryKind::File
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
            continue;
        };
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(std::io::Error::other)?
            .to_path_buf();
        entries.push(TreeEntry { relative, kind });
    }
    Ok(entries)
}

/// Totals from a [`copy_tree`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Recreate `source` under `destination`, overwriting files that already exist.
///
/// Not atomic: on error the destination holds whatever was copied so far.
pub fn copy_tree(
    source: &Path,
    destination: &Path,
    exclusion: &Exclusion,
) -> Result<CopyStats, StoreError> {
    fs::create_dir_all(destination)?;
    let mut stats = CopyStats::default();
    for entry in walk(source, exclusion)? {
        let target = destination.join(&entry.relative);
        match entry.kind {
            EntryKind::Dir => fs::create_dir_all(&target)?,
            EntryKind::File => {
                stats.bytes += fs::copy(source.join(&entry.relative), &target)?;
                stats.files += 1;
            }
        }
    }
    Ok(stats)
}

/// Delete `tree` and everything beneath it, deepest entries first.
///
/// Returns the number of entries removed, the root included.
pub fn remove_tree(tree: &Path) -> Result<u64, StoreError> {
    let mut removed = 0;
    for entry in WalkDir::new(tree).follow_links(false).contents_first(true) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
        removed += 1;
    }
    Ok(removed)
}
