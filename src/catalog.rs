//! Snapshot enumeration under the backup root
//!
//! The backup root has no manifest or index: its immediate subdirectories are
//! the index. A subdirectory is a snapshot if and only if its name is a
//! canonical rendering of [`TIMESTAMP_FORMAT`]. Anything else (stray files,
//! hand-made folders, the progress journal) is skipped silently.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use savetime::catalog::SnapshotCatalog;
//! use savetime::types::SnapshotSelector;
//!
//! # fn main() -> savetime::Result<()> {
//! let catalog = SnapshotCatalog::new("/home/user/backups");
//! let snapshots = catalog.list()?;
//! if let Some(latest) = SnapshotCatalog::select(&snapshots, &SnapshotSelector::Latest) {
//!     println!("latest snapshot: {}", latest.name);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SaveTimeError};
use crate::types::{Snapshot, SnapshotSelector};
use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Directory-name format of a snapshot (second granularity, sorts lexicographically)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Lists and selects snapshots stored under one backup root
#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    root: PathBuf,
}

impl SnapshotCatalog {
    /// Create a catalog for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The backup root this catalog reads
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate snapshots, sorted ascending by timestamp
    ///
    /// # Errors
    ///
    /// - [`SaveTimeError::BackupRootNotFound`] if the root does not exist;
    ///   callers decide whether that means "no snapshots"
    /// - [`SaveTimeError::Io`] if the root cannot be read
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SaveTimeError::BackupRootNotFound(self.root.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                trace!("Skipping non UTF-8 entry {:?}", path);
                continue;
            };
            match parse_snapshot_name(name) {
                Some(timestamp) => snapshots.push(Snapshot {
                    name: name.to_string(),
                    timestamp,
                    path,
                }),
                None => trace!("Skipping non-snapshot directory {:?}", path),
            }
        }

        snapshots.sort();
        debug!("Found {} snapshots in {:?}", snapshots.len(), self.root);
        Ok(snapshots)
    }

    /// Like [`list`](Self::list), but a missing root yields an empty list
    pub fn list_or_empty(&self) -> Result<Vec<Snapshot>> {
        match self.list() {
            Err(SaveTimeError::BackupRootNotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Path a snapshot taken at `timestamp` would occupy
    pub fn path_for(&self, timestamp: NaiveDateTime) -> PathBuf {
        self.root.join(snapshot_name(timestamp))
    }

    /// Resolve a selector against an ascending snapshot list
    ///
    /// `ByName` picks the matching snapshot when present. A name that is not
    /// in the catalog falls back to the latest snapshot, with a warning.
    /// Returns `None` only when `snapshots` is empty.
    pub fn select(snapshots: &[Snapshot], selector: &SnapshotSelector) -> Option<Snapshot> {
        if let SnapshotSelector::ByName(name) = selector {
            if let Some(found) = snapshots.iter().find(|s| &s.name == name) {
                return Some(found.clone());
            }
            if !snapshots.is_empty() {
                warn!("Snapshot {} not found, falling back to the latest", name);
            }
        }
        snapshots.iter().max().cloned()
    }

    /// Snapshots to delete so that at most `retain` remain, oldest first
    pub fn plan_prune(snapshots: &[Snapshot], retain: usize) -> Vec<Snapshot> {
        let mut sorted = snapshots.to_vec();
        sorted.sort();
        let excess = sorted.len().saturating_sub(retain);
        sorted.truncate(excess);
        sorted
    }
}

/// Render the directory name for `timestamp`
pub fn snapshot_name(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a directory name, accepting only the canonical rendering
///
/// Non-canonical spellings (e.g. unpadded fields) are rejected so that
/// lexicographic and chronological order always agree.
pub fn parse_snapshot_name(name: &str) -> Option<NaiveDateTime> {
    let timestamp = NaiveDateTime::parse_from_str(name, TIMESTAMP_FORMAT).ok()?;
    (snapshot_name(timestamp) == name).then_some(timestamp)
}
