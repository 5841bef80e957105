//! # SaveTime - Phase-guarded save-directory snapshots
//!
//! A library for backing up a single "live" directory (a game save folder,
//! typically) into timestamped snapshot directories and restoring it from
//! them, using nothing but rename, copy and delete.
//!
//! ## Overview
//!
//! SaveTime lets you:
//! - Copy the live directory into a new snapshot named after the current time
//! - Keep only the N most recent snapshots
//! - Restore the latest (or a named) snapshot, parking the previous live
//!   directory at `<live>.bak`
//! - Refuse to touch anything while the target process is running
//! - Launch the target process after a restore
//! - Run any of the above on the calling thread or in the background
//!
//! ## Architecture
//!
//! - **Phase guard**: a process-wide two-state cell ([`PhaseTracker`]) updated
//!   with compare-and-swap. At most one backup or restore runs at a time; a
//!   request that arrives while one is running is dropped, not queued
//! - **Catalog**: the backup root's subdirectories are the index; names follow
//!   [`catalog::TIMESTAMP_FORMAT`] and sort chronologically
//! - **Rotator**: the marker rename and the recursive copy, each a named step
//! - **Orchestrators**: [`RestoreOrchestrator`] and [`BackupOrchestrator`]
//!   compose the above with the collaborator traits in [`collaborators`]
//! - **Journal**: a small JSON file listing completed steps, removed on success
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use savetime::{ExecutionMode, SaveTime, SnapshotSelector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let savetime = SaveTime::new("./save00", "./backups")?;
//!
//! let backup = savetime.backup(ExecutionMode::Blocking);
//! if let Some(result) = backup.wait() {
//!     println!("Created backup {}", result?.snapshot);
//! }
//!
//! let restore = savetime.restore(SnapshotSelector::Latest, ExecutionMode::Blocking);
//! if let Some(result) = restore.wait() {
//!     println!("Restored {} files", result?.copied.files);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Background Operations
//!
//! ```rust,no_run
//! use savetime::{Dispatch, ExecutionMode, SaveTime, SnapshotSelector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let savetime = SaveTime::new("./save00", "./backups")?;
//!
//! match savetime.restore(SnapshotSelector::Latest, ExecutionMode::Background) {
//!     Dispatch::Detached(handle) => {
//!         // Dropping the handle would leave the restore running
//!         let report = handle.completion().await?;
//!         println!("Restored {}", report.snapshot);
//!     }
//!     Dispatch::Skipped(reason) => println!("Skipped: {}", reason),
//!     Dispatch::Finished(result) => {
//!         result?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Failures are logged through `tracing` and returned as [`SaveTimeError`] in
//! [`Dispatch::Finished`] or from [`OperationHandle::wait`]. The phase guard
//! is released on every path, including panics. A failed launch after a
//! successful restore is reported in [`RestoreReport::launch`] and never
//! turns the restore into an error.
//!
//! ## Module Organization
//!
//! - [`savetime`]: the [`SaveTime`] facade and its builder
//! - [`restore`], [`backup`]: the two orchestrators
//! - [`catalog`], [`rotator`]: snapshot listing and filesystem steps
//! - [`phase`]: the phase guard
//! - [`task`]: background execution and cancellation
//! - [`journal`]: the progress journal
//! - [`collaborators`]: process probe and launcher seams
//! - [`config`]: config file and environment loading
//! - [`types`], [`error`]: shared data types and errors

// Public API modules
pub mod backup;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod journal;
pub mod phase;
pub mod restore;
pub mod rotator;
pub mod savetime;
pub mod task;
pub mod types;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use backup::BackupOrchestrator;
pub use catalog::SnapshotCatalog;
pub use collaborators::{CommandLauncher, Launcher, NeverRunning, NoLauncher, ProcessProbe, TargetProbe};
pub use error::{Result, SaveTimeError};
pub use journal::{JournalEntry, OperationKind, Step};
pub use phase::{PhaseGuard, PhaseTracker};
pub use restore::RestoreOrchestrator;
pub use rotator::SnapshotRotator;
pub use savetime::{SaveTime, SaveTimeBuilder};
pub use task::{CancelToken, Dispatch, OperationHandle};
pub use types::*;
