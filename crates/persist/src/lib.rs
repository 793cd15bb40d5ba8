//! Integrity-checked world backups.
//!
//! Takes a one-time copy of each live world directory, records a SHA-256
//! manifest of the copy, and restores from it only after the manifest still
//! matches.
//!
//! # Invariants
//! - A manifest holds exactly one entry per non-transient regular file.
//! - A backup is taken at most once per world and never refreshed.
//! - A backup that fails verification is never restored; the live world is
//!   left untouched.
//! - One world's failure never stops work on the others.

pub mod error;
pub mod hasher;
pub mod manifest;
pub mod orchestrator;
pub mod store;
pub mod tree;

pub use error::StoreError;
pub use manifest::{Manifest, ManifestDiff};
pub use orchestrator::{BackupOrchestrator, BatchReport, UnitOutcome, UnitReport, UnitStatus};
pub use store::{
    BackupState, BackupStatus, NoopQuiescer, Quiescer, RestoreStatus, SnapshotStore, Verification,
};
pub use tree::{CopyStats, DEFAULT_TRANSIENT_SUFFIX, Exclusion};

pub fn crate_info() -> &'static str {
    concat!("worldvault-persist v", env!("CARGO_PKG_VERSION"))
}
