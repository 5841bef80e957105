//! Core data types used throughout the savetime library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Guard state**: [`Phase`] - the two-state guard preventing overlapping operations
//! - **On-disk state**: [`Snapshot`] - a timestamped copy of the live directory
//! - **Requests**: [`SnapshotSelector`], [`ExecutionMode`] - what to restore and how to run
//! - **Results**: [`RestoreReport`], [`BackupReport`], [`CopyStats`], [`SkipReason`]
//! - **Configuration**: [`SaveTimeConfig`] - the externally supplied paths and flags
//!
//! ## Examples
//!
//! ```rust
//! use savetime::types::{SnapshotSelector, ExecutionMode};
//!
//! let selector = SnapshotSelector::from(Some("2024-05-01-12-00-00".to_string()));
//! assert_eq!(selector, SnapshotSelector::ByName("2024-05-01-12-00-00".to_string()));
//! assert!(ExecutionMode::from_background(true).is_background());
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Phase of the process-wide operation guard
///
/// Exactly one orchestrated operation may observe `Started` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No operation in progress
    Stopped,
    /// A backup or restore owns the guard
    Started,
}

impl Phase {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Phase::Stopped => 0,
            Phase::Started => 1,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            Phase::Stopped
        } else {
            Phase::Started
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Stopped => write!(f, "stopped"),
            Phase::Started => write!(f, "started"),
        }
    }
}

/// A timestamped copy of the live directory stored under the backup root
///
/// The directory name encodes the timestamp (see
/// [`TIMESTAMP_FORMAT`](crate::catalog::TIMESTAMP_FORMAT)). Snapshots order by
/// timestamp first and by name second, so ordering is total even if two
/// directory names were ever to parse to the same instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Directory name, e.g. `2024-05-01-12-00-00`
    pub name: String,
    /// Timestamp parsed from the name (local wall-clock time)
    pub timestamp: NaiveDateTime,
    /// Absolute path of the snapshot directory
    pub path: PathBuf,
}

impl Ord for Snapshot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Snapshot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Which snapshot a restore should materialize
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnapshotSelector {
    /// The snapshot with the greatest timestamp
    #[default]
    Latest,
    /// A specific snapshot by directory name
    ByName(String),
}

impl From<Option<String>> for SnapshotSelector {
    fn from(name: Option<String>) -> Self {
        match name {
            Some(name) if !name.trim().is_empty() => SnapshotSelector::ByName(name),
            _ => SnapshotSelector::Latest,
        }
    }
}

/// How an orchestrated operation is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Run on the calling thread and block until done
    #[default]
    Blocking,
    /// Run on a detached worker thread
    Background,
}

impl ExecutionMode {
    /// Map the `async` flag used by callers onto a mode
    pub fn from_background(background: bool) -> Self {
        if background {
            ExecutionMode::Background
        } else {
            ExecutionMode::Blocking
        }
    }

    /// Whether this mode runs detached from the caller
    pub fn is_background(self) -> bool {
        self == ExecutionMode::Background
    }
}

/// Why a request was dropped without touching the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The target process reported itself running
    TargetRunning,
    /// Another operation holds the phase guard
    Busy,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TargetRunning => write!(f, "target process is running"),
            SkipReason::Busy => write!(f, "another operation is in progress"),
        }
    }
}

/// Counters collected while copying a directory tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    /// Regular files copied
    pub files: usize,
    /// Directories created below the destination root
    pub directories: usize,
    /// Bytes written
    pub bytes: u64,
}

impl CopyStats {
    /// Fold another set of counters into this one
    pub fn merge(&mut self, other: CopyStats) {
        self.files += other.files;
        self.directories += other.directories;
        self.bytes += other.bytes;
    }
}

/// Outcome of the post-restore launch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LaunchStatus {
    /// Auto-launch is disabled
    #[default]
    NotRequested,
    /// The launcher reported success
    Launched,
    /// The launcher failed; the restore itself still succeeded
    Failed(String),
}

/// Result of a completed restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Snapshot that was materialized
    pub snapshot: Snapshot,
    /// Whether an existing live directory was moved to the marker
    pub rotated: bool,
    /// Copy counters
    pub copied: CopyStats,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Post-restore launch outcome
    pub launch: LaunchStatus,
}

/// Result of a completed backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    /// Snapshot that was created
    pub snapshot: Snapshot,
    /// Copy counters
    pub copied: CopyStats,
    /// Snapshots removed by retention pruning, oldest first
    pub pruned: Vec<Snapshot>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Configuration consumed by the orchestrators
///
/// Keys use the kebab-case names of the on-disk config file
/// (`source-path`, `destination-path`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SaveTimeConfig {
    /// The live directory being protected
    pub source_path: PathBuf,
    /// The backup root holding snapshots
    pub destination_path: PathBuf,
    /// Snapshots to keep after a backup (`None` keeps all)
    #[serde(default)]
    pub retain: Option<usize>,
    /// Launch the target after a successful restore
    #[serde(default)]
    pub auto_launch: bool,
    /// Process name probed before every operation
    #[serde(default)]
    pub target_process: Option<String>,
    /// Program started by the auto-launch step
    #[serde(default)]
    pub launch_command: Option<PathBuf>,
    /// Arguments passed to `launch_command`
    #[serde(default)]
    pub launch_args: Vec<String>,
}

impl SaveTimeConfig {
    /// Create a config with just the two required paths
    pub fn new(source_path: impl Into<PathBuf>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            retain: None,
            auto_launch: false,
            target_process: None,
            launch_command: None,
            launch_args: Vec::new(),
        }
    }
}
