//! Utility functions for savetime
//!
//! Small filesystem and formatting helpers shared by the rotator, the
//! orchestrators and the progress journal.
//!
//! ## Categories of Utilities
//!
//! ### File Operations
//! - Idempotent removal of a file or directory tree
//! - Atomic file writing
//! - Symbolic link creation
//!
//! ### Path Manipulation
//! - Appending a suffix to the last path component
//! - Converting paths below a base into relative paths
//!
//! ### Formatting
//! - Human-readable byte counts
//!
//! All functions are thread-safe and can be called concurrently.

use crate::error::{Result, SaveTimeError};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Remove a file or directory tree, treating a missing path as success
///
/// Returns `true` if something was removed.
pub fn remove_path_if_exists(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => {
            trace!("Removed {:?}", path);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Append `suffix` to the final component of `path`
///
/// `/saves/save00` with `.bak` becomes `/saves/save00.bak`. Unlike
/// [`Path::with_extension`] this never replaces an existing extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first and falls back to canonicalising both paths
/// when the lexical form differs (relative components, symlinked prefixes).
///
/// # Errors
///
/// - [`SaveTimeError::Internal`] if the path is not under the base path
/// - [`SaveTimeError::Io`] if canonicalization fails (fallback case only)
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            SaveTimeError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Format bytes in human-readable form (binary units)
///
/// ```rust,ignore
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// The target is either the complete new content or the previous content,
/// never a partial write.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = with_suffix(path, ".tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::unix::fs::symlink;
    symlink(target, link)?;
    Ok(())
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if target.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}
