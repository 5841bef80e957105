//! Restore orchestration
//!
//! A restore moves the live directory aside and replaces it with the contents
//! of one snapshot:
//!
//! 1. probe the target process; a running target drops the request
//! 2. take the phase guard; a busy phase drops the request
//! 3. list the catalog and resolve the selector (empty catalog: stop here)
//! 4. `remove-marker`, `rename-live` (live becomes `<live>.bak`)
//! 5. `create-live`, `copy-snapshot`
//! 6. release the phase guard
//! 7. launch the target if auto-launch is enabled
//!
//! The selector is resolved before anything on disk changes, so an empty or
//! missing backup root never costs the user their live directory. Failures
//! are logged and the guard is released on every path; a blocking caller also
//! gets the first failure back as the `Err` of [`Dispatch::Finished`].

use crate::catalog::SnapshotCatalog;
use crate::collaborators::{Launcher, NeverRunning, NoLauncher, TargetProbe};
use crate::error::{Result, SaveTimeError};
use crate::journal::{Journal, OperationKind, Step};
use crate::phase::{PhaseGuard, PhaseTracker};
use crate::rotator::SnapshotRotator;
use crate::task::{self, CancelToken, Dispatch};
use crate::types::{ExecutionMode, LaunchStatus, RestoreReport, SnapshotSelector};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Restores a snapshot into the live directory under the phase guard
#[derive(Clone)]
pub struct RestoreOrchestrator {
    live: PathBuf,
    catalog: SnapshotCatalog,
    rotator: SnapshotRotator,
    phase: Arc<PhaseTracker>,
    probe: Arc<dyn TargetProbe>,
    launcher: Arc<dyn Launcher>,
    auto_launch: bool,
}

impl fmt::Debug for RestoreOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreOrchestrator")
            .field("live", &self.live)
            .field("catalog", &self.catalog)
            .field("rotator", &self.rotator)
            .field("phase", &self.phase.phase())
            .field("auto_launch", &self.auto_launch)
            .finish_non_exhaustive()
    }
}

impl RestoreOrchestrator {
    /// Restore into `live` from snapshots in `catalog`, guarded by `phase`
    ///
    /// The target is assumed never to run and auto-launch is off until
    /// configured with [`with_probe`](Self::with_probe) and
    /// [`with_launcher`](Self::with_launcher).
    pub fn new(live: impl Into<PathBuf>, catalog: SnapshotCatalog, phase: Arc<PhaseTracker>) -> Self {
        Self {
            live: live.into(),
            catalog,
            rotator: SnapshotRotator::new(),
            phase,
            probe: Arc::new(NeverRunning),
            launcher: Arc::new(NoLauncher),
            auto_launch: false,
        }
    }

    /// Use `probe` to decide whether the target is running
    pub fn with_probe(mut self, probe: Arc<dyn TargetProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Launch the target through `launcher` after each restore when `auto_launch` is set
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>, auto_launch: bool) -> Self {
        self.launcher = launcher;
        self.auto_launch = auto_launch;
        self
    }

    /// Use a custom rotator (marker suffix)
    pub fn with_rotator(mut self, rotator: SnapshotRotator) -> Self {
        self.rotator = rotator;
        self
    }

    /// The live directory
    pub fn live(&self) -> &Path {
        &self.live
    }

    /// The catalog snapshots are restored from
    pub fn catalog(&self) -> &SnapshotCatalog {
        &self.catalog
    }

    /// Restore the snapshot picked by `selector`
    ///
    /// Returns [`Dispatch::Skipped`] without touching the filesystem if the
    /// target is running or another operation holds the phase. In
    /// [`ExecutionMode::Background`] the phase is taken before the worker
    /// starts and the returned handle may be dropped.
    #[instrument(skip(self), fields(live = ?self.live))]
    pub fn restore(
        &self,
        selector: SnapshotSelector,
        mode: ExecutionMode,
    ) -> Dispatch<RestoreReport> {
        let this = self.clone();
        task::dispatch(
            OperationKind::Restore,
            mode,
            &self.phase,
            self.probe.as_ref(),
            move |guard, id, cancel| this.run(guard, id, &selector, mode, cancel),
        )
    }

    fn run(
        &self,
        guard: PhaseGuard,
        id: Uuid,
        selector: &SnapshotSelector,
        mode: ExecutionMode,
        cancel: &CancelToken,
    ) -> Result<RestoreReport> {
        let start = Instant::now();

        let snapshots = self.catalog.list_or_empty().inspect_err(|e| {
            error!("Failed to list backups in {:?}: {}", self.catalog.root(), e);
        })?;
        let Some(snapshot) = SnapshotCatalog::select(&snapshots, selector) else {
            warn!("no backups found in {:?}", self.catalog.root());
            return Err(SaveTimeError::NoSnapshots(self.catalog.root().to_path_buf()));
        };
        info!("Restoring backup {} into {:?}", snapshot.name, self.live);

        let mut journal = Journal::begin(self.catalog.root(), id, OperationKind::Restore, &snapshot.name);

        self.rotator
            .remove_marker(&self.live)
            .inspect_err(|e| error!(step = "remove-marker", "Failed to delete marker: {}", e))?;
        journal.record(Step::RemoveMarker);

        let rotated = self
            .rotator
            .rename_live_to_marker(&self.live)
            .inspect_err(|e| error!(step = "rename-live", "Failed to rename live directory: {}", e))?;
        journal.record(Step::RenameLive);

        self.rotator
            .create_live(&self.live)
            .inspect_err(|e| error!(step = "create-live", "Failed to create live directory: {}", e))?;
        journal.record(Step::CreateLive);

        let copied = self
            .rotator
            .copy_snapshot(&snapshot, &self.live, cancel)
            .inspect_err(|e| {
                error!(step = "copy-snapshot", "Failed to copy backup {}: {}", snapshot.name, e)
            })?;
        journal.record(Step::CopySnapshot);

        journal.finish();
        guard.release();

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "successfully restored backup {} in {}ms ({} files)",
            snapshot.name, duration_ms, copied.files
        );

        let launch = self.launch_after_restore(mode);
        Ok(RestoreReport {
            snapshot,
            rotated,
            copied,
            duration_ms,
            launch,
        })
    }

    fn launch_after_restore(&self, mode: ExecutionMode) -> LaunchStatus {
        if !self.auto_launch {
            return LaunchStatus::NotRequested;
        }
        match self.launcher.launch(mode) {
            Ok(()) => LaunchStatus::Launched,
            Err(e) => {
                warn!("Restore succeeded but launching the target failed: {}", e);
                LaunchStatus::Failed(e.to_string())
            }
        }
    }
}
