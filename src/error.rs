//! Error types for the savetime library
//!
//! This module defines every error an orchestrated backup or restore can
//! surface. Filesystem failures (missing paths, permissions, I/O during
//! copy/rename/delete) arrive as [`SaveTimeError::Io`] or
//! [`SaveTimeError::WalkDir`]; the remaining variants describe orchestration
//! outcomes such as an empty catalog or a running target process.
//!
//! Orchestrators never propagate these to background callers. They are logged
//! through `tracing` and, for blocking runs, returned as the single error that
//! summarises the first failure encountered.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the savetime library
pub type Result<T> = std::result::Result<T, SaveTimeError>;

/// Main error type for all savetime operations
#[derive(Debug, Error)]
pub enum SaveTimeError {
    /// I/O errors during copy, rename or delete
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors while walking a directory tree
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Errors reading or writing the JSON config and journal files
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backup root directory does not exist
    #[error("Backup root not found: {0:?}")]
    BackupRootNotFound(PathBuf),

    /// The backup root holds no snapshots to restore from
    #[error("No backups found in {0:?}")]
    NoSnapshots(PathBuf),

    /// A snapshot with the same second-granularity name already exists
    #[error("Snapshot already exists: {0:?}")]
    SnapshotAlreadyExists(PathBuf),

    /// The target process is running; the operation was not attempted
    #[error("Target process is running")]
    TargetRunning,

    /// The post-restore launch failed
    #[error("Launch failed: {0}")]
    Launcher(String),

    /// The operation was cancelled between file copies
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SaveTimeError {
    /// Create a launcher error with a custom message
    pub fn launcher(msg: impl Into<String>) -> Self {
        SaveTimeError::Launcher(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        SaveTimeError::InvalidConfiguration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SaveTimeError::Internal(msg.into())
    }

    /// Check if retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SaveTimeError::TargetRunning
                | SaveTimeError::Cancelled
                | SaveTimeError::SnapshotAlreadyExists(_)
                | SaveTimeError::Launcher(_)
        )
    }

    /// Check if this error came from the filesystem
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            SaveTimeError::Io(_) | SaveTimeError::WalkDir(_) | SaveTimeError::BackupRootNotFound(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SaveTimeError::NoSnapshots(root) => {
                format!("No backups found in {:?}. Run 'savetime backup' first.", root)
            }
            SaveTimeError::BackupRootNotFound(root) => {
                format!(
                    "Backup directory {:?} does not exist. Check 'destination-path' in your config.",
                    root
                )
            }
            SaveTimeError::TargetRunning => {
                "The target process is running. Close it before backing up or restoring.".to_string()
            }
            SaveTimeError::SnapshotAlreadyExists(path) => {
                format!("Snapshot {:?} already exists. Wait a second and try again.", path)
            }
            _ => self.to_string(),
        }
    }
}
