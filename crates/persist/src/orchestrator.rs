//! Batch backup and restore across every configured world.
//!
//! Worlds are processed one at a time, in the order given. A failure in one
//! world is recorded in the report and never stops the others.

use serde::Serialize;
use std::fmt;
use worldvault_common::UnitName;

use crate::error::StoreError;
use crate::store::{BackupState, BackupStatus, RestoreStatus, SnapshotStore, Verification};

/// Per-world result of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Backup taken, restore applied, or backup verified intact.
    Completed,
    AlreadyDone,
    /// Nothing to act on: no live world for a backup, no backup for a restore.
    Missing,
    Corrupted,
    Failed,
}

impl UnitOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, UnitOutcome::Corrupted | UnitOutcome::Failed)
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            UnitOutcome::Completed => "ok",
            UnitOutcome::AlreadyDone => "already done",
            UnitOutcome::Missing => "missing",
            UnitOutcome::Corrupted => "CORRUPTED",
            UnitOutcome::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub unit: UnitName,
    pub outcome: UnitOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UnitReport {
    fn new(unit: &UnitName, outcome: UnitOutcome) -> Self {
        Self {
            unit: unit.clone(),
            outcome,
            detail: None,
        }
    }

    fn with_error(unit: &UnitName, outcome: UnitOutcome, err: &StoreError) -> Self {
        Self {
            unit: unit.clone(),
            outcome,
            detail: Some(err.to_string()),
        }
    }
}

/// Aggregate result of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// True only when no world failed or was found corrupted.
    pub success: bool,
    pub units: Vec<UnitReport>,
}

impl BatchReport {
    fn from_units(units: Vec<UnitReport>) -> Self {
        let success = units.iter().all(|u| !u.outcome.is_failure());
        Self { success, units }
    }

    pub fn outcome(&self, unit: &UnitName) -> Option<UnitOutcome> {
        self.units
            .iter()
            .find(|u| &u.unit == unit)
            .map(|u| u.outcome)
    }

    pub fn count(&self, outcome: UnitOutcome) -> usize {
        self.units.iter().filter(|u| u.outcome == outcome).count()
    }
}

/// Backup-side state of one world, as reported by [`BackupOrchestrator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub unit: UnitName,
    pub state: BackupState,
}

enum RestoreCheck {
    Restorable,
    MissingBackup,
    Corrupted(StoreError),
    Unreadable(StoreError),
}

pub struct BackupOrchestrator {
    store: SnapshotStore,
}

impl BackupOrchestrator {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    /// Classify every world without acting on any of them.
    pub fn status(&self, units: &[UnitName]) -> Vec<UnitStatus> {
        units
            .iter()
            .map(|unit| UnitStatus {
                unit: unit.clone(),
                state: self.store.classify_backup(unit),
            })
            .collect()
    }

    /// Take the first backup of every world that has none yet.
    pub fn backup_all(&self, units: &[UnitName]) -> BatchReport {
        let _span = tracing::info_span!("backup_all", worlds = units.len()).entered();

        if let Err(e) = self.store.ensure_backup_root() {
            tracing::error!("cannot create backup directory: {e}");
            return BatchReport::from_units(
                units
                    .iter()
                    .map(|u| UnitReport::with_error(u, UnitOutcome::Failed, &e))
                    .collect(),
            );
        }

        let (mut pending, mut missing, mut done) = (0, 0, 0);
        for status in self.status(units) {
            match status.state {
                BackupState::Pending => pending += 1,
                BackupState::MissingLive => missing += 1,
                BackupState::AlreadyBackedUp => done += 1,
                BackupState::Incomplete => {
                    tracing::warn!(unit = %status.unit, "backup directory has no manifest");
                    done += 1;
                }
            }
        }
        tracing::info!("{pending} world(s) to back up, {missing} missing, {done} already backed up");

        let reports = units
            .iter()
            .map(|unit| match self.store.backup(unit) {
                Ok(BackupStatus::Created(_)) => UnitReport::new(unit, UnitOutcome::Completed),
                Ok(BackupStatus::AlreadyBackedUp) => UnitReport::new(unit, UnitOutcome::AlreadyDone),
                Ok(BackupStatus::MissingLive) => UnitReport::new(unit, UnitOutcome::Missing),
                Err(e) => {
                    tracing::warn!(%unit, "backup failed: {e}");
                    UnitReport::with_error(unit, UnitOutcome::Failed, &e)
                }
            })
            .collect();
        let report = BatchReport::from_units(reports);
        log_summary("backup", &report);
        report
    }

    /// Check every backup against its manifest. Nothing is quiesced or written.
    pub fn verify_all(&self, units: &[UnitName]) -> BatchReport {
        let _span = tracing::info_span!("verify_all", worlds = units.len()).entered();
        let reports = units
            .iter()
            .map(|unit| match self.check(unit) {
                RestoreCheck::Restorable => UnitReport::new(unit, UnitOutcome::Completed),
                RestoreCheck::MissingBackup => UnitReport::new(unit, UnitOutcome::Missing),
                RestoreCheck::Corrupted(e) => {
                    UnitReport::with_error(unit, UnitOutcome::Corrupted, &e)
                }
                RestoreCheck::Unreadable(e) => UnitReport::with_error(unit, UnitOutcome::Failed, &e),
            })
            .collect();
        let report = BatchReport::from_units(reports);
        log_summary("verify", &report);
        report
    }

    /// Restore every world whose backup verifies.
    ///
    /// All restorable worlds are quiesced together, with a single grace
    /// period, before any live tree is touched. When no world is restorable
    /// the batch fails without quiescing anything.
    pub fn restore_all(&self, units: &[UnitName]) -> BatchReport {
        let _span = tracing::info_span!("restore_all", worlds = units.len()).entered();

        let checks: Vec<(&UnitName, RestoreCheck)> =
            units.iter().map(|unit| (unit, self.check(unit))).collect();
        let restorable: Vec<UnitName> = checks
            .iter()
            .filter(|(_, check)| matches!(check, RestoreCheck::Restorable))
            .map(|(unit, _)| (*unit).clone())
            .collect();
        let missing = checks
            .iter()
            .filter(|(_, c)| matches!(c, RestoreCheck::MissingBackup))
            .count();
        let bad = checks.len() - restorable.len() - missing;
        tracing::info!(
            "{} world(s) restorable, {missing} without backup, {bad} corrupted or unreadable",
            restorable.len()
        );

        let mut reports = Vec::with_capacity(checks.len());
        if restorable.is_empty() {
            tracing::error!("no world can be restored");
            for (unit, check) in checks {
                reports.push(check_report(unit, check));
            }
            return BatchReport {
                success: false,
                units: reports,
            };
        }

        self.store.quiesce(&restorable);
        for (unit, check) in checks {
            let report = match check {
                RestoreCheck::Restorable => match self.store.replace_live(unit) {
                    Ok(_) => UnitReport::new(unit, UnitOutcome::Completed),
                    Err(e) => {
                        tracing::error!(%unit, "restore failed, live world may be incomplete: {e}");
                        UnitReport::with_error(unit, UnitOutcome::Failed, &e)
                    }
                },
                other => check_report(unit, other),
            };
            reports.push(report);
        }
        let report = BatchReport::from_units(reports);
        log_summary("restore", &report);
        report
    }

    /// Restore a single world, quiescing only that world.
    pub fn restore_one(&self, unit: &UnitName) -> UnitReport {
        match self.store.restore(unit) {
            Ok(RestoreStatus::Restored(_)) => UnitReport::new(unit, UnitOutcome::Completed),
            Ok(RestoreStatus::Unavailable) => UnitReport::new(unit, UnitOutcome::Missing),
            Err(e) if e.is_integrity_failure() => {
                tracing::warn!(%unit, "{e}");
                UnitReport::with_error(unit, UnitOutcome::Corrupted, &e)
            }
            Err(e) => {
                tracing::error!(%unit, "restore failed: {e}");
                UnitReport::with_error(unit, UnitOutcome::Failed, &e)
            }
        }
    }

    fn check(&self, unit: &UnitName) -> RestoreCheck {
        match self.store.verify(unit) {
            Ok(Verification::Intact { .. }) => RestoreCheck::Restorable,
            Ok(Verification::Unavailable) => {
                tracing::info!(%unit, "no backup");
                RestoreCheck::MissingBackup
            }
            Err(e) if e.is_integrity_failure() => {
                tracing::warn!(%unit, "{e}");
                RestoreCheck::Corrupted(e)
            }
            Err(e) => {
                tracing::warn!(%unit, "cannot verify backup: {e}");
                RestoreCheck::Unreadable(e)
            }
        }
    }
}

/// Report for a world that was not restored.
fn check_report(unit: &UnitName, check: RestoreCheck) -> UnitReport {
    match check {
        RestoreCheck::Restorable => UnitReport::new(unit, UnitOutcome::AlreadyDone),
        RestoreCheck::MissingBackup => UnitReport::new(unit, UnitOutcome::Missing),
        RestoreCheck::Corrupted(e) => UnitReport::with_error(unit, UnitOutcome::Corrupted, &e),
        RestoreCheck::Unreadable(e) => UnitReport::with_error(unit, UnitOutcome::Failed, &e),
    }
}

fn log_summary(operation: &str, report: &BatchReport) {
    let failed = report.units.iter().filter(|u| u.outcome.is_failure()).count();
    if report.success {
        tracing::info!("{operation} finished for {} world(s)", report.units.len());
    } else {
        tracing::warn!(
            "{operation} finished with {failed} of {} world(s) failing",
            report.units.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{RecordingQuiescer, unit, write_world};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn orchestrator(root: &Path) -> (BackupOrchestrator, RecordingQuiescer) {
        let quiescer = RecordingQuiescer::default();
        let store = SnapshotStore::new(root, root.join("backup"))
            .with_grace_period(Duration::ZERO)
            .with_quiescer(quiescer.clone());
        (BackupOrchestrator::new(store), quiescer)
    }

    fn corrupt(path: &Path) {
        let mut data = fs::read(path).unwrap();
        data[0] ^= 0xff;
        fs::write(path, data).unwrap();
    }

    #[test]
    fn backup_all_handles_each_world_independently() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(tmp.path());
        write_world(tmp.path(), "world");
        write_world(tmp.path(), "world_nether");
        let units = [unit("world"), unit("world_nether"), unit("world_the_end")];

        let first = orch.backup_all(&units);
        assert!(first.success);
        assert_eq!(first.outcome(&units[0]), Some(UnitOutcome::Completed));
        assert_eq!(first.outcome(&units[1]), Some(UnitOutcome::Completed));
        assert_eq!(first.outcome(&units[2]), Some(UnitOutcome::Missing));

        let second = orch.backup_all(&units);
        assert!(second.success);
        assert_eq!(second.count(UnitOutcome::AlreadyDone), 2);
        assert_eq!(second.count(UnitOutcome::Missing), 1);
    }

    #[test]
    fn backup_all_with_nothing_live_creates_only_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(tmp.path());
        let units = [unit("world")];

        let report = orch.backup_all(&units);
        assert!(report.success);
        assert_eq!(report.outcome(&units[0]), Some(UnitOutcome::Missing));
        let backup_root = tmp.path().join("backup");
        assert!(backup_root.is_dir());
        assert_eq!(fs::read_dir(&backup_root).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn backup_all_reports_failure_and_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        write_world(tmp.path(), "b");
        fs::write(tmp.path().join("a/bad\nname.dat"), b"x").unwrap();
        let units = [unit("a"), unit("b")];

        let report = orch.backup_all(&units);
        assert!(!report.success);
        assert_eq!(report.outcome(&units[0]), Some(UnitOutcome::Failed));
        assert_eq!(report.outcome(&units[1]), Some(UnitOutcome::Completed));
        assert!(!tmp.path().join("backup/a.manifest").exists());

        // The partial copy now counts as an existing backup.
        let again = orch.backup_all(&units);
        assert!(again.success);
        assert_eq!(again.outcome(&units[0]), Some(UnitOutcome::AlreadyDone));
        assert_eq!(
            orch.status(&units[..1])[0].state,
            BackupState::Incomplete
        );
    }

    #[test]
    fn restore_all_restores_good_and_reports_corrupted() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, quiescer) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        write_world(tmp.path(), "b");
        let units = [unit("a"), unit("b")];
        assert!(orch.backup_all(&units).success);

        fs::write(tmp.path().join("a/level.dat"), b"lost progress").unwrap();
        fs::write(tmp.path().join("b/level.dat"), b"keep me").unwrap();
        corrupt(&tmp.path().join("backup/b/level.dat"));

        let report = orch.restore_all(&units);
        assert!(!report.success);
        assert_eq!(report.outcome(&units[0]), Some(UnitOutcome::Completed));
        assert_eq!(report.outcome(&units[1]), Some(UnitOutcome::Corrupted));
        assert!(report.units[1].detail.is_some());

        assert_eq!(fs::read(tmp.path().join("a/level.dat")).unwrap(), b"a level");
        assert_eq!(fs::read(tmp.path().join("b/level.dat")).unwrap(), b"keep me");
        assert_eq!(quiescer.calls(), ["evict:a", "unload:a"]);
    }

    #[test]
    fn restore_all_quiesces_whole_batch_before_any_removal() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, quiescer) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        write_world(tmp.path(), "b");
        let units = [unit("a"), unit("b")];
        orch.backup_all(&units);

        let report = orch.restore_all(&units);
        assert!(report.success);
        assert_eq!(
            quiescer.calls(),
            ["evict:a", "evict:b", "unload:a", "unload:b"]
        );
    }

    #[test]
    fn restore_all_with_nothing_restorable_fails_without_quiescing() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, quiescer) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        write_world(tmp.path(), "b");
        orch.backup_all(&[unit("a")]);
        corrupt(&tmp.path().join("backup/a/level.dat"));

        let report = orch.restore_all(&[unit("a"), unit("b")]);
        assert!(!report.success);
        assert_eq!(report.outcome(&unit("a")), Some(UnitOutcome::Corrupted));
        assert_eq!(report.outcome(&unit("b")), Some(UnitOutcome::Missing));
        assert!(quiescer.calls().is_empty());
        assert_eq!(fs::read(tmp.path().join("a/level.dat")).unwrap(), b"a level");
    }

    #[test]
    fn restore_all_treats_missing_backup_as_non_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        orch.backup_all(&[unit("a")]);

        let report = orch.restore_all(&[unit("a"), unit("b")]);
        assert!(report.success);
        assert_eq!(report.outcome(&unit("b")), Some(UnitOutcome::Missing));
    }

    #[test]
    fn verify_all_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, quiescer) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        write_world(tmp.path(), "b");
        let units = [unit("a"), unit("b"), unit("c")];
        orch.backup_all(&units);
        corrupt(&tmp.path().join("backup/b/region/r.0.0.mca"));
        fs::write(tmp.path().join("a/level.dat"), b"live edit").unwrap();

        let report = orch.verify_all(&units);
        assert!(!report.success);
        assert_eq!(report.outcome(&units[0]), Some(UnitOutcome::Completed));
        assert_eq!(report.outcome(&units[1]), Some(UnitOutcome::Corrupted));
        assert_eq!(report.outcome(&units[2]), Some(UnitOutcome::Missing));
        assert!(quiescer.calls().is_empty());
        assert_eq!(fs::read(tmp.path().join("a/level.dat")).unwrap(), b"live edit");
    }

    #[test]
    fn status_classifies_without_acting() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, _) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        write_world(tmp.path(), "b");
        orch.backup_all(&[unit("a")]);
        fs::create_dir_all(tmp.path().join("backup/partial")).unwrap();

        let states: Vec<_> = orch
            .status(&[unit("a"), unit("b"), unit("c"), unit("partial")])
            .into_iter()
            .map(|s| s.state)
            .collect();
        assert_eq!(
            states,
            [
                BackupState::AlreadyBackedUp,
                BackupState::Pending,
                BackupState::MissingLive,
                BackupState::Incomplete
            ]
        );
        assert!(!tmp.path().join("backup/b").exists());
    }

    #[test]
    fn restore_one_maps_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, quiescer) = orchestrator(tmp.path());
        write_world(tmp.path(), "a");
        orch.backup_all(&[unit("a")]);

        assert_eq!(orch.restore_one(&unit("a")).outcome, UnitOutcome::Completed);
        assert_eq!(orch.restore_one(&unit("z")).outcome, UnitOutcome::Missing);
        assert_eq!(quiescer.calls(), ["evict:a", "unload:a"]);
    }

    #[test]
    fn report_serializes_as_json() {
        let report = BatchReport::from_units(vec![
            UnitReport::new(&unit("world"), UnitOutcome::AlreadyDone),
            UnitReport {
                unit: unit("world_nether"),
                outcome: UnitOutcome::Corrupted,
                detail: Some("integrity check failed".into()),
            },
        ]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["units"][0]["unit"], "world");
        assert_eq!(value["units"][0]["outcome"], "already_done");
        assert!(value["units"][0].get("detail").is_none());
        assert_eq!(value["units"][1]["outcome"], "corrupted");
    }

    #[test]
    fn outcomes_display_for_humans() {
        assert_eq!(UnitOutcome::AlreadyDone.to_string(), "already done");
        assert_eq!(UnitOutcome::Corrupted.to_string(), "CORRUPTED");
        assert_eq!(format!("[{:<8}]", UnitOutcome::Completed), "[ok      ]");
    }
}
