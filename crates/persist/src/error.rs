use std::path::PathBuf;

use worldvault_common::UnitName;

/// Errors from snapshot, verify and restore operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("path cannot be recorded in a manifest: {}", .0.display())]
    UnrecordablePath(PathBuf),
    #[error("no manifest for backup of {0}")]
    MissingManifest(UnitName),
    #[error(
        "integrity check failed for {unit}: {missing} missing, {unexpected} unexpected, {changed} changed"
    )]
    IntegrityMismatch {
        unit: UnitName,
        missing: usize,
        unexpected: usize,
        changed: usize,
    },
}

impl StoreError {
    /// True for failures that mean the backup cannot be trusted, as opposed
    /// to failures to read or write it.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            StoreError::MissingManifest(_) | StoreError::IntegrityMismatch { .. }
        )
    }
}
