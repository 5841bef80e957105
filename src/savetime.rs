//! Main SaveTime implementation
//!
//! [`SaveTime`] wires one live directory and one backup root to a restore and
//! a backup orchestrator that share the same phase guard, probe and launcher.
//! Most callers build one from a [`SaveTimeConfig`] and never touch the
//! orchestrators directly.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use savetime::{ExecutionMode, SaveTime, SnapshotSelector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let savetime = SaveTime::new("./save00", "./backups")?;
//!
//! // Blocking backup keeping the three most recent snapshots
//! if let Some(result) = savetime.backup_with_retention(ExecutionMode::Blocking, Some(3)).wait() {
//!     println!("created {}", result?.snapshot);
//! }
//!
//! // Fire-and-forget restore of the latest snapshot
//! let _ = savetime.restore(SnapshotSelector::Latest, ExecutionMode::Background);
//! # Ok(())
//! # }
//! ```

use crate::backup::BackupOrchestrator;
use crate::catalog::SnapshotCatalog;
use crate::collaborators::{CommandLauncher, Launcher, NeverRunning, NoLauncher, ProcessProbe, TargetProbe};
use crate::config;
use crate::error::Result;
use crate::journal::{Journal, JournalEntry};
use crate::phase::PhaseTracker;
use crate::restore::RestoreOrchestrator;
use crate::rotator::{SnapshotRotator, MARKER_SUFFIX};
use crate::task::Dispatch;
use crate::types::{
    BackupReport, ExecutionMode, Phase, RestoreReport, SaveTimeConfig, Snapshot, SnapshotSelector,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Backup and restore of one live directory
#[derive(Debug, Clone)]
pub struct SaveTime {
    restorer: RestoreOrchestrator,
    backer: BackupOrchestrator,
    rotator: SnapshotRotator,
    phase: Arc<PhaseTracker>,
    retain: Option<usize>,
}

impl SaveTime {
    /// Manage `source` (the live directory) with snapshots under `destination`
    ///
    /// Uses the process-wide phase guard, never probes for a running target
    /// and keeps every snapshot.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Result<Self> {
        SaveTimeBuilder::new().build(source, destination)
    }

    /// Build from a loaded configuration
    ///
    /// # Errors
    ///
    /// [`SaveTimeError::InvalidConfiguration`](crate::SaveTimeError::InvalidConfiguration)
    /// if the configured paths are empty, identical or nested.
    pub fn from_config(config: &SaveTimeConfig) -> Result<Self> {
        SaveTimeBuilder::from_config(config).build(&config.source_path, &config.destination_path)
    }

    /// Restore a snapshot into the live directory
    pub fn restore(&self, selector: SnapshotSelector, mode: ExecutionMode) -> Dispatch<RestoreReport> {
        self.restorer.restore(selector, mode)
    }

    /// Restore the most recent snapshot
    pub fn restore_latest(&self, mode: ExecutionMode) -> Dispatch<RestoreReport> {
        self.restorer.restore(SnapshotSelector::Latest, mode)
    }

    /// Create a snapshot using the configured retention count
    pub fn backup(&self, mode: ExecutionMode) -> Dispatch<BackupReport> {
        self.backer.backup(mode, self.retain)
    }

    /// Create a snapshot with an explicit retention count
    pub fn backup_with_retention(
        &self,
        mode: ExecutionMode,
        retain: Option<usize>,
    ) -> Dispatch<BackupReport> {
        self.backer.backup(mode, retain)
    }

    /// Delete the oldest snapshots so at most `retain` remain
    pub fn prune(&self, retain: usize) -> Dispatch<Vec<Snapshot>> {
        self.backer.prune(retain)
    }

    /// Snapshots under the backup root, oldest first
    ///
    /// A missing backup root is reported as an empty list.
    #[instrument(skip(self))]
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.backer.catalog().list_or_empty()
    }

    /// Current phase of the guard shared by both orchestrators
    pub fn phase(&self) -> Phase {
        self.phase.phase()
    }

    /// Journal left behind by an interrupted or failed operation
    pub fn pending_journal(&self) -> Result<Option<JournalEntry>> {
        Journal::load(self.backup_root())
    }

    /// Delete a leftover journal
    pub fn clear_journal(&self) -> Result<bool> {
        Journal::clear(self.backup_root())
    }

    /// The live directory
    pub fn live(&self) -> &Path {
        self.restorer.live()
    }

    /// The backup root
    pub fn backup_root(&self) -> &Path {
        self.backer.catalog().root()
    }

    /// Where a restore parks the previous live directory
    pub fn marker_path(&self) -> PathBuf {
        self.rotator.marker_path(self.live())
    }

    /// Retention count applied by [`backup`](Self::backup)
    pub fn retain(&self) -> Option<usize> {
        self.retain
    }
}

/// Builder for [`SaveTime`]
///
/// ```rust,no_run
/// use savetime::{CommandLauncher, ProcessProbe, SaveTimeBuilder};
/// use std::sync::Arc;
///
/// # fn main() -> savetime::Result<()> {
/// let savetime = SaveTimeBuilder::new()
///     .probe(Arc::new(ProcessProbe::new("noita.exe")))
///     .launcher(Arc::new(CommandLauncher::new("/games/noita/noita.exe", vec![])))
///     .auto_launch(true)
///     .retain(Some(5))
///     .build("/saves/save00", "/backups")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct SaveTimeBuilder {
    phase: Option<Arc<PhaseTracker>>,
    probe: Option<Arc<dyn TargetProbe>>,
    launcher: Option<Arc<dyn Launcher>>,
    auto_launch: bool,
    retain: Option<usize>,
    marker_suffix: Option<String>,
}

impl fmt::Debug for SaveTimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveTimeBuilder")
            .field("auto_launch", &self.auto_launch)
            .field("retain", &self.retain)
            .field("marker_suffix", &self.marker_suffix)
            .finish_non_exhaustive()
    }
}

impl SaveTimeBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with the probe, launcher and retention of `config`
    pub fn from_config(config: &SaveTimeConfig) -> Self {
        let mut builder = Self::new()
            .auto_launch(config.auto_launch)
            .retain(config.retain);
        if let Some(name) = &config.target_process {
            builder = builder.probe(Arc::new(ProcessProbe::new(name.clone())));
        }
        if let Some(program) = &config.launch_command {
            builder = builder.launcher(Arc::new(CommandLauncher::new(
                program.clone(),
                config.launch_args.clone(),
            )));
        }
        builder
    }

    /// Guard shared with other instances; defaults to [`PhaseTracker::global`]
    pub fn phase(mut self, phase: Arc<PhaseTracker>) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Probe consulted before every backup and restore
    pub fn probe(mut self, probe: Arc<dyn TargetProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Launcher used after a restore when auto-launch is enabled
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Launch the target after each successful restore
    pub fn auto_launch(mut self, enabled: bool) -> Self {
        self.auto_launch = enabled;
        self
    }

    /// Snapshots kept after each backup; `None` keeps all
    pub fn retain(mut self, retain: Option<usize>) -> Self {
        self.retain = retain;
        self
    }

    /// Suffix of the marker directory (default `.bak`)
    pub fn marker_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.marker_suffix = Some(suffix.into());
        self
    }

    /// Build the instance
    ///
    /// # Errors
    ///
    /// [`SaveTimeError::InvalidConfiguration`](crate::SaveTimeError::InvalidConfiguration)
    /// if the paths are empty, identical or nested, or if the backup root
    /// lies at or below the marker of the live directory.
    pub fn build(
        self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Result<SaveTime> {
        let source = source.into();
        let destination = destination.into();
        let marker_suffix = self.marker_suffix.as_deref().unwrap_or(MARKER_SUFFIX);
        config::validate_paths(&source, &destination, marker_suffix)?;

        let rotator = SnapshotRotator::with_suffix(marker_suffix);
        let phase = self.phase.unwrap_or_else(PhaseTracker::global);
        let probe = self.probe.unwrap_or_else(|| Arc::new(NeverRunning));
        let launcher = self.launcher.unwrap_or_else(|| Arc::new(NoLauncher));
        let catalog = SnapshotCatalog::new(destination);

        debug!(
            "Managing {:?} with backups in {:?} (auto-launch: {})",
            source,
            catalog.root(),
            self.auto_launch
        );

        let restorer = RestoreOrchestrator::new(&source, catalog.clone(), phase.clone())
            .with_probe(probe.clone())
            .with_launcher(launcher, self.auto_launch)
            .with_rotator(rotator.clone());
        let backer = BackupOrchestrator::new(source, catalog, phase.clone()).with_probe(probe);

        Ok(SaveTime {
            restorer,
            backer,
            rotator,
            phase,
            retain: self.retain,
        })
    }
}
