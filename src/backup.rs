//! Backup orchestration and retention pruning
//!
//! A backup copies the live directory into a new snapshot named after the
//! current local time, then optionally prunes the oldest snapshots so that at
//! most `retain` remain. It shares the phase guard and the target probe with
//! restores, so a backup and a restore never overlap.
//!
//! A copy that fails part-way removes the half-written snapshot directory;
//! otherwise the catalog would offer it as the latest backup on the next
//! restore. Pruning is best effort: a snapshot that cannot be deleted is
//! logged and skipped.

use crate::catalog::{snapshot_name, SnapshotCatalog};
use crate::collaborators::{NeverRunning, TargetProbe};
use crate::error::{Result, SaveTimeError};
use crate::journal::{Journal, OperationKind, Step};
use crate::phase::{PhaseGuard, PhaseTracker};
use crate::rotator::copy_tree;
use crate::task::{self, CancelToken, Dispatch};
use crate::types::{BackupReport, ExecutionMode, Snapshot};
use crate::utils;
use chrono::{Local, NaiveDateTime, Timelike};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Creates snapshots of the live directory and prunes old ones
#[derive(Clone)]
pub struct BackupOrchestrator {
    live: PathBuf,
    catalog: SnapshotCatalog,
    phase: Arc<PhaseTracker>,
    probe: Arc<dyn TargetProbe>,
}

impl fmt::Debug for BackupOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupOrchestrator")
            .field("live", &self.live)
            .field("catalog", &self.catalog)
            .field("phase", &self.phase.phase())
            .finish_non_exhaustive()
    }
}

impl BackupOrchestrator {
    /// Back up `live` into `catalog`'s root, guarded by `phase`
    pub fn new(live: impl Into<PathBuf>, catalog: SnapshotCatalog, phase: Arc<PhaseTracker>) -> Self {
        Self {
            live: live.into(),
            catalog,
            phase,
            probe: Arc::new(NeverRunning),
        }
    }

    /// Use `probe` to decide whether the target is running
    pub fn with_probe(mut self, probe: Arc<dyn TargetProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// The live directory
    pub fn live(&self) -> &Path {
        &self.live
    }

    /// The catalog new snapshots are written to
    pub fn catalog(&self) -> &SnapshotCatalog {
        &self.catalog
    }

    /// Snapshot the live directory, then keep at most `retain` snapshots
    ///
    /// `retain = None` keeps everything. `Some(0)` deletes every snapshot,
    /// including the one just written.
    #[instrument(skip(self), fields(live = ?self.live))]
    pub fn backup(&self, mode: ExecutionMode, retain: Option<usize>) -> Dispatch<BackupReport> {
        let this = self.clone();
        task::dispatch(
            OperationKind::Backup,
            mode,
            &self.phase,
            self.probe.as_ref(),
            move |guard, id, cancel| this.run(guard, id, retain, cancel),
        )
    }

    /// Delete the oldest snapshots so that at most `retain` remain
    ///
    /// Runs on the calling thread under the phase guard. Pruning never touches
    /// the live directory, so the target probe is not consulted.
    #[instrument(skip(self))]
    pub fn prune(&self, retain: usize) -> Dispatch<Vec<Snapshot>> {
        let this = self.clone();
        task::dispatch(
            OperationKind::Prune,
            ExecutionMode::Blocking,
            &self.phase,
            &NeverRunning,
            move |_guard, _id, _cancel| this.prune_locked(retain),
        )
    }

    fn run(
        &self,
        guard: PhaseGuard,
        id: Uuid,
        retain: Option<usize>,
        cancel: &CancelToken,
    ) -> Result<BackupReport> {
        let start = Instant::now();

        if !self.live.is_dir() {
            error!("Nothing to back up, {:?} does not exist", self.live);
            return Err(SaveTimeError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("live directory {:?} does not exist", self.live),
            )));
        }
        fs::create_dir_all(self.catalog.root())
            .inspect_err(|e| error!("Failed to create backup root {:?}: {}", self.catalog.root(), e))?;

        let timestamp = now_truncated();
        let snapshot = Snapshot {
            name: snapshot_name(timestamp),
            timestamp,
            path: self.catalog.path_for(timestamp),
        };
        if fs::symlink_metadata(&snapshot.path).is_ok() {
            warn!("Backup {} already exists, try again in a second", snapshot.name);
            return Err(SaveTimeError::SnapshotAlreadyExists(snapshot.path));
        }
        info!("Backing up {:?} to {}", self.live, snapshot.name);

        let mut journal = Journal::begin(self.catalog.root(), id, OperationKind::Backup, &snapshot.name);

        info!(step = "copy-live", "Copying {:?} to {:?}", self.live, snapshot.path);
        let copied = match copy_tree(&self.live, &snapshot.path, cancel) {
            Ok(stats) => stats,
            Err(e) => {
                error!(step = "copy-live", "Failed to copy {:?}: {}", self.live, e);
                if let Err(cleanup) = utils::remove_path_if_exists(&snapshot.path) {
                    warn!("Failed to remove partial backup {:?}: {}", snapshot.path, cleanup);
                }
                return Err(e);
            }
        };
        journal.record(Step::CopyLive);

        let pruned = match retain {
            Some(retain) => self.prune_after_backup(retain, &mut journal),
            None => Vec::new(),
        };

        journal.finish();
        guard.release();

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Created backup {} in {}ms ({} files, {}, {} pruned)",
            snapshot.name,
            duration_ms,
            copied.files,
            utils::format_bytes(copied.bytes),
            pruned.len()
        );

        Ok(BackupReport {
            snapshot,
            copied,
            pruned,
            duration_ms,
        })
    }

    /// Prune once the new snapshot is written; a failure leaves the backup intact
    fn prune_after_backup(&self, retain: usize, journal: &mut Journal) -> Vec<Snapshot> {
        match self.prune_locked(retain) {
            Ok(pruned) => {
                journal.record(Step::Prune);
                pruned
            }
            Err(e) => {
                warn!("Backup written but pruning failed: {}", e);
                Vec::new()
            }
        }
    }

    fn prune_locked(&self, retain: usize) -> Result<Vec<Snapshot>> {
        let snapshots = self.catalog.list_or_empty()?;
        let doomed = SnapshotCatalog::plan_prune(&snapshots, retain);
        if doomed.is_empty() {
            debug!(step = "prune", "{} backups, nothing to prune", snapshots.len());
            return Ok(doomed);
        }

        info!(step = "prune", "Pruning {} of {} backups", doomed.len(), snapshots.len());
        let mut removed = Vec::with_capacity(doomed.len());
        for snapshot in doomed {
            match utils::remove_path_if_exists(&snapshot.path) {
                Ok(_) => {
                    debug!("Deleted backup {}", snapshot.name);
                    removed.push(snapshot);
                }
                Err(e) => warn!("Failed to delete backup {}: {}", snapshot.name, e),
            }
        }
        Ok(removed)
    }
}

fn now_truncated() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
