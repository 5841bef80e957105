//! Filesystem steps that move the live directory in and out of snapshots
//!
//! ## Steps
//!
//! | Step | Operation | Idempotent precondition |
//! |------|-----------|-------------------------|
//! | `remove-marker` | delete `<live><suffix>` | a missing marker is not an error |
//! | `rename-live` | rename `<live>` to `<live><suffix>` | a missing live directory is skipped |
//! | `create-live` | create `<live>` and parents | an existing directory is kept |
//! | `copy-snapshot` | recursive copy snapshot -> live | files are overwritten |
//!
//! The rename is one filesystem call and therefore atomic. The delete before
//! it is not atomic with the rename: a crash in between leaves neither a
//! marker nor a live directory. That window is accepted. The copy is not
//! transactional either; a failure part-way leaves the live directory
//! partially populated while the marker still holds the previous contents.

use crate::error::{Result, SaveTimeError};
use crate::task::CancelToken;
use crate::types::{CopyStats, Snapshot};
use crate::utils;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};
use walkdir::WalkDir;

/// Suffix appended to the live directory to form the backup marker
pub const MARKER_SUFFIX: &str = ".bak";

/// Performs the rotate and materialize steps of a restore
#[derive(Debug, Clone)]
pub struct SnapshotRotator {
    marker_suffix: String,
}

impl SnapshotRotator {
    /// Create a rotator using [`MARKER_SUFFIX`]
    pub fn new() -> Self {
        Self::with_suffix(MARKER_SUFFIX)
    }

    /// Create a rotator with a custom marker suffix
    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            marker_suffix: suffix.into(),
        }
    }

    /// The marker sibling of `live`
    pub fn marker_path(&self, live: &Path) -> PathBuf {
        utils::with_suffix(live, &self.marker_suffix)
    }

    /// Delete any existing marker; a missing marker is not an error
    pub fn remove_marker(&self, live: &Path) -> Result<bool> {
        let marker = self.marker_path(live);
        info!(step = "remove-marker", "Deleting stale marker {:?}", marker);
        utils::remove_path_if_exists(&marker)
    }

    /// Rename `live` to its marker path
    ///
    /// Returns `false` without touching anything if `live` does not exist.
    pub fn rename_live_to_marker(&self, live: &Path) -> Result<bool> {
        if fs::symlink_metadata(live).is_err() {
            debug!(step = "rename-live", "Live directory {:?} is absent, nothing to rotate", live);
            return Ok(false);
        }
        let marker = self.marker_path(live);
        info!(step = "rename-live", "Renaming {:?} to {:?}", live, marker);
        fs::rename(live, &marker)?;
        Ok(true)
    }

    /// Mark the live directory as a backup: delete the stale marker, then rename
    ///
    /// Running this twice in a row (with the live directory recreated in
    /// between) never fails because of the marker left by the first run.
    /// Returns whether a live directory was moved.
    pub fn rotate_live_to_marker(&self, live: &Path) -> Result<bool> {
        self.remove_marker(live)?;
        self.rename_live_to_marker(live)
    }

    /// Create the empty live directory (and parents); an existing one is kept
    pub fn create_live(&self, live: &Path) -> Result<()> {
        info!(step = "create-live", "Creating {:?}", live);
        fs::create_dir_all(live)?;
        Ok(())
    }

    /// Copy every entry of `snapshot` into `live`, checking `cancel` between files
    pub fn copy_snapshot(
        &self,
        snapshot: &Snapshot,
        live: &Path,
        cancel: &CancelToken,
    ) -> Result<CopyStats> {
        info!(step = "copy-snapshot", "Copying snapshot {} to {:?}", snapshot.name, live);
        let stats = copy_tree(&snapshot.path, live, cancel)?;
        debug!(
            "Materialized {} ({} files, {})",
            snapshot.name,
            stats.files,
            utils::format_bytes(stats.bytes)
        );
        Ok(stats)
    }

    /// Create `live` (and parents) and copy every entry of `snapshot` into it
    ///
    /// # Errors
    ///
    /// - [`SaveTimeError::Io`] if the snapshot is missing or any copy fails
    /// - [`SaveTimeError::Cancelled`] if `cancel` fired mid-copy
    pub fn materialize_snapshot(
        &self,
        snapshot: &Snapshot,
        live: &Path,
        cancel: &CancelToken,
    ) -> Result<CopyStats> {
        self.create_live(live)?;
        self.copy_snapshot(snapshot, live, cancel)
    }
}

impl Default for SnapshotRotator {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively copy the contents of `src` into `dst`, preserving relative structure
///
/// `dst` is created if absent. Symbolic links are recreated as links rather
/// than followed.
pub fn copy_tree(src: &Path, dst: &Path, cancel: &CancelToken) -> Result<CopyStats> {
    if !src.is_dir() {
        return Err(SaveTimeError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory {:?} does not exist", src),
        )));
    }
    fs::create_dir_all(dst)?;

    let mut stats = CopyStats::default();
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        cancel.check()?;
        let entry = entry?;
        let relative = utils::make_relative(entry.path(), src)?;
        let target = dst.join(&relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            stats.directories += 1;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            utils::remove_path_if_exists(&target)?;
            utils::create_symlink(&link_target, &target)?;
            trace!("Linked {:?} -> {:?}", relative, link_target);
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            stats.bytes += fs::copy(entry.path(), &target)?;
            stats.files += 1;
            trace!("Copied {:?}", relative);
        }
    }
    Ok(stats)
}
