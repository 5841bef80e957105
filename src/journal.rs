//! Progress journal for multi-step operations
//!
//! Every backup and restore is a short list of named [`Step`]s. While an
//! operation runs, a small JSON file in the backup root records which steps
//! have completed. The file is removed once the operation finishes
//! successfully, so a journal left on disk means a process died or an
//! operation failed part-way; `savetime status` shows it.
//!
//! The journal is advisory. Failing to write it is logged and never aborts
//! the operation it describes. Nothing resumes or rolls back automatically.
//!
//! ```json
//! {
//!   "id": "6f1c...",
//!   "kind": "restore",
//!   "snapshot": "2024-05-01-12-00-00",
//!   "started-at": "2024-05-01T12:03:11Z",
//!   "completed": ["remove-marker", "rename-live"]
//! }
//! ```

use crate::error::Result;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// File name of the journal inside the backup root
pub const JOURNAL_FILE: &str = ".savetime-journal.json";

/// A named step of a backup or restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Delete the stale backup marker
    RemoveMarker,
    /// Rename the live directory to the marker
    RenameLive,
    /// Create the empty live directory
    CreateLive,
    /// Copy a snapshot into the live directory
    CopySnapshot,
    /// Copy the live directory into a new snapshot
    CopyLive,
    /// Delete snapshots beyond the retention count
    Prune,
}

impl Step {
    /// Stable name used in logs and on disk
    pub fn as_str(self) -> &'static str {
        match self {
            Step::RemoveMarker => "remove-marker",
            Step::RenameLive => "rename-live",
            Step::CreateLive => "create-live",
            Step::CopySnapshot => "copy-snapshot",
            Step::CopyLive => "copy-live",
            Step::Prune => "prune",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which orchestrator wrote the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A backup run
    Backup,
    /// A restore run
    Restore,
    /// A standalone prune
    Prune,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Backup => f.write_str("backup"),
            OperationKind::Restore => f.write_str("restore"),
            OperationKind::Prune => f.write_str("prune"),
        }
    }
}

/// On-disk content of the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JournalEntry {
    /// Operation id (matches the `op` field in logs)
    pub id: Uuid,
    /// Operation kind
    pub kind: OperationKind,
    /// Snapshot being restored or created
    pub snapshot: String,
    /// When the operation started
    pub started_at: DateTime<Utc>,
    /// Steps completed so far, in order
    pub completed: Vec<Step>,
}

impl JournalEntry {
    /// Last step that completed, if any
    pub fn last_step(&self) -> Option<Step> {
        self.completed.last().copied()
    }
}

/// Writer for one operation's journal
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    entry: JournalEntry,
    enabled: bool,
}

impl Journal {
    /// Journal location inside `root`
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(JOURNAL_FILE)
    }

    /// Start a journal for a new operation and write it to `root`
    pub fn begin(root: &Path, id: Uuid, kind: OperationKind, snapshot: &str) -> Self {
        let mut journal = Self {
            path: Self::path_in(root),
            entry: JournalEntry {
                id,
                kind,
                snapshot: snapshot.to_string(),
                started_at: Utc::now(),
                completed: Vec::new(),
            },
            enabled: true,
        };
        if let Err(e) = journal.persist() {
            warn!("Progress journal disabled, cannot write {:?}: {}", journal.path, e);
            journal.enabled = false;
        }
        journal
    }

    /// Current entry
    pub fn entry(&self) -> &JournalEntry {
        &self.entry
    }

    /// Record that `step` completed
    pub fn record(&mut self, step: Step) {
        self.entry.completed.push(step);
        debug!(step = step.as_str(), "Step completed");
        if !self.enabled {
            return;
        }
        if let Err(e) = self.persist() {
            warn!("Failed to update progress journal {:?}: {}", self.path, e);
        }
    }

    /// Remove the journal after a successful operation
    pub fn finish(self) {
        if !self.enabled {
            return;
        }
        if let Err(e) = utils::remove_path_if_exists(&self.path) {
            warn!("Failed to remove progress journal {:?}: {}", self.path, e);
        }
    }

    /// Read a journal left in `root`, if any
    pub fn load(root: &Path) -> Result<Option<JournalEntry>> {
        let content = match fs::read(Self::path_in(root)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Delete a leftover journal, returning whether one existed
    pub fn clear(root: &Path) -> Result<bool> {
        utils::remove_path_if_exists(&Self::path_in(root))
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entry)?;
        utils::atomic_write(&self.path, &json)
    }
}
