//! File-backed world backups with verified restore.
//!
//! Layout:
//! ```text
//! <root>/<world>/                 live world, owned by the host
//! <backup_root>/<world>/          copy taken on first successful backup
//! <backup_root>/<world>.manifest  path:sha256 records for that copy
//! ```
//!
//! A world is backed up at most once. The copy and its manifest are never
//! refreshed by this crate; deleting the backup directory is the only way to
//! take a new one.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use worldvault_common::{MANIFEST_SUFFIX, UnitName, VaultConfig};

use crate::error::StoreError;
use crate::manifest::Manifest;
use crate::tree::{CopyStats, Exclusion, copy_tree, remove_tree};

/// Hooks into the host service, invoked before a live world is overwritten.
pub trait Quiescer {
    /// Ask everyone using `unit` to disconnect. The store waits out its grace
    /// period afterwards whether or not they have.
    fn evict_active_users(&self, unit: &UnitName);

    /// Make the host release `unit`'s files without saving them. Called
    /// right before the live tree is removed.
    fn unload_from_service(&self, unit: &UnitName);
}

/// Quiescer for when no host service is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQuiescer;

impl Quiescer for NoopQuiescer {
    fn evict_active_users(&self, _unit: &UnitName) {}
    fn unload_from_service(&self, _unit: &UnitName) {}
}

/// Where a world stands before a backup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupState {
    /// Live world present, no backup yet.
    Pending,
    /// Neither a live world nor a backup.
    MissingLive,
    AlreadyBackedUp,
    /// Backup directory exists but its manifest does not. Never rebuilt.
    Incomplete,
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            BackupState::Pending => "pending",
            BackupState::MissingLive => "missing live world",
            BackupState::AlreadyBackedUp => "backed up",
            BackupState::Incomplete => "incomplete backup",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    Created(CopyStats),
    AlreadyBackedUp,
    MissingLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    Restored(CopyStats),
    /// No backup exists for the world.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Intact { files: usize },
    Unavailable,
}

/// Backup and restore of worlds under a common root.
pub struct SnapshotStore {
    live_root: PathBuf,
    backup_root: PathBuf,
    exclusion: Exclusion,
    grace_period: Duration,
    quiescer: Box<dyn Quiescer>,
}

impl SnapshotStore {
    /// Store with the default lock-file exclusion, a one second grace period
    /// and no host attached.
    pub fn new(live_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            live_root: live_root.into(),
            backup_root: backup_root.into(),
            exclusion: Exclusion::default(),
            grace_period: Duration::from_secs(1),
            quiescer: Box::new(NoopQuiescer),
        }
    }

    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(&config.root, config.backup_root())
            .with_exclusion(Exclusion::new(config.transient_suffix.clone()))
            .with_grace_period(config.grace_period())
    }

    pub fn with_exclusion(mut self, exclusion: Exclusion) -> Self {
        self.exclusion = exclusion;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_quiescer(mut self, quiescer: impl Quiescer + 'static) -> Self {
        self.quiescer = Box::new(quiescer);
        self
    }

    pub fn live_dir(&self, unit: &UnitName) -> PathBuf {
        self.live_root.join(unit.as_str())
    }

    pub fn backup_dir(&self, unit: &UnitName) -> PathBuf {
        self.backup_root.join(unit.as_str())
    }

    pub fn manifest_path(&self, unit: &UnitName) -> PathBuf {
        self.backup_root.join(format!("{unit}{MANIFEST_SUFFIX}"))
    }

    /// Create the backup root if needed.
    pub fn ensure_backup_root(&self) -> Result<(), StoreError> {
        if !self.backup_root.is_dir() {
            tracing::info!(path = %self.backup_root.display(), "creating backup directory");
            fs::create_dir_all(&self.backup_root)?;
        }
        Ok(())
    }

    pub fn classify_backup(&self, unit: &UnitName) -> BackupState {
        if self.backup_dir(unit).exists() {
            if self.manifest_path(unit).exists() {
                BackupState::AlreadyBackedUp
            } else {
                BackupState::Incomplete
            }
        } else if self.live_dir(unit).is_dir() {
            BackupState::Pending
        } else {
            BackupState::MissingLive
        }
    }

    /// Copy the live world into the backup root and record its manifest,
    /// unless a backup directory already exists.
    ///
    /// On error the partial copy is left in place and will count as an
    /// existing backup on the next call.
    pub fn backup(&self, unit: &UnitName) -> Result<BackupStatus, StoreError> {
        let backup_dir = self.backup_dir(unit);
        if backup_dir.exists() {
            if !self.manifest_path(unit).exists() {
                tracing::warn!(%unit, "backup has no manifest and cannot be restored");
            }
            return Ok(BackupStatus::AlreadyBackedUp);
        }

        let live_dir = self.live_dir(unit);
        if !live_dir.is_dir() {
            tracing::info!(%unit, "no live world, nothing to back up");
            return Ok(BackupStatus::MissingLive);
        }

        tracing::info!(%unit, "backing up world");
        let stats = copy_tree(&live_dir, &backup_dir, &self.exclusion)?;
        let manifest = Manifest::build(&backup_dir, &self.exclusion)?;
        manifest.write(&self.manifest_path(unit))?;
        tracing::info!(%unit, files = stats.files, bytes = stats.bytes, "backup complete");
        Ok(BackupStatus::Created(stats))
    }

    /// Recompute the backup's manifest and compare it with the recorded one.
    /// Touches nothing.
    pub fn verify(&self, unit: &UnitName) -> Result<Verification, StoreError> {
        let backup_dir = self.backup_dir(unit);
        if !backup_dir.exists() {
            return Ok(Verification::Unavailable);
        }

        let recorded = Manifest::read(&self.manifest_path(unit))?
            .ok_or_else(|| StoreError::MissingManifest(unit.clone()))?;
        let actual = Manifest::build(&backup_dir, &self.exclusion)?;
        if !recorded.equals(&actual) {
            let diff = recorded.diff(&actual);
            for path in &diff.missing {
                tracing::debug!(%unit, path = %path, "recorded file missing from backup");
            }
            for path in &diff.unexpected {
                tracing::debug!(%unit, path = %path, "unrecorded file in backup");
            }
            for path in &diff.changed {
                tracing::debug!(%unit, path = %path, "backup file digest changed");
            }
            return Err(StoreError::IntegrityMismatch {
                unit: unit.clone(),
                missing: diff.missing.len(),
                unexpected: diff.unexpected.len(),
                changed: diff.changed.len(),
            });
        }
        Ok(Verification::Intact {
            files: actual.len(),
        })
    }

    /// Verify the backup, quiesce the world, then replace the live tree with
    /// the backup copy.
    ///
    /// Integrity failures leave the live world untouched. Failures after
    /// quiescing are not rolled back: the live world may be missing or
    /// partially restored.
    pub fn restore(&self, unit: &UnitName) -> Result<RestoreStatus, StoreError> {
        match self.verify(unit)? {
            Verification::Unavailable => {
                tracing::info!(%unit, "no backup, nothing to restore");
                return Ok(RestoreStatus::Unavailable);
            }
            Verification::Intact { files } => {
                tracing::info!(%unit, files, "integrity verified, restoring");
            }
        }
        self.quiesce(std::slice::from_ref(unit));
        let stats = self.replace_live(unit)?;
        Ok(RestoreStatus::Restored(stats))
    }

    /// Evict users of every listed world, then wait out the grace period once.
    pub(crate) fn quiesce(&self, units: &[UnitName]) {
        for unit in units {
            self.quiescer.evict_active_users(unit);
        }
        if !self.grace_period.is_zero() {
            std::thread::sleep(self.grace_period);
        }
    }

    /// Remove the live world, if any, and copy the backup over it.
    pub(crate) fn replace_live(&self, unit: &UnitName) -> Result<CopyStats, StoreError> {
        let live_dir = self.live_dir(unit);
        if live_dir.exists() {
            self.quiescer.unload_from_service(unit);
            remove_tree(&live_dir)?;
        }
        let stats = copy_tree(&self.backup_dir(unit), &live_dir, &self.exclusion)?;
        tracing::info!(%unit, files = stats.files, "restore complete");
        Ok(stats)
    }
}
