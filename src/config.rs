//! Configuration loading
//!
//! Settings come from a JSON file with kebab-case keys, overridden by
//! `SAVETIME_*` environment variables:
//!
//! ```json
//! {
//!   "source-path": "/home/user/.local/share/noita/save00",
//!   "destination-path": "/home/user/noita-backups",
//!   "retain": 10,
//!   "auto-launch": true,
//!   "target-process": "noita.exe",
//!   "launch-command": "/games/noita/noita.exe"
//! }
//! ```
//!
//! Without an explicit path the file is `$HOME/.savetime.json`, and a missing
//! default file is fine as long as the environment supplies both paths.

use crate::error::{Result, SaveTimeError};
use crate::rotator::MARKER_SUFFIX;
use crate::types::SaveTimeConfig;
use crate::utils;
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File name of the default config in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".savetime.json";

/// Live directory override
pub const ENV_SOURCE_PATH: &str = "SAVETIME_SOURCE_PATH";
/// Backup root override
pub const ENV_DESTINATION_PATH: &str = "SAVETIME_DESTINATION_PATH";
/// Retention count override
pub const ENV_RETAIN: &str = "SAVETIME_RETAIN";
/// Auto-launch override (`true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`)
pub const ENV_AUTO_LAUNCH: &str = "SAVETIME_AUTO_LAUNCH";
/// Probed process name override
pub const ENV_TARGET_PROCESS: &str = "SAVETIME_TARGET_PROCESS";
/// Launch program override
pub const ENV_LAUNCH_COMMAND: &str = "SAVETIME_LAUNCH_COMMAND";

/// `$HOME/.savetime.json`, if a home directory is known
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
}

/// Load the config file and apply environment overrides
///
/// # Errors
///
/// - [`SaveTimeError::Io`] if an explicitly given file cannot be read
/// - [`SaveTimeError::Json`] if the file is not valid JSON
/// - [`SaveTimeError::InvalidConfiguration`] if a path is missing after
///   overrides or the result fails [`SaveTimeConfig::validate`]
pub fn load(path: Option<&Path>) -> Result<SaveTimeConfig> {
    load_with_paths(path, None, None)
}

/// [`load`], with explicit paths taking precedence over the file and environment
///
/// Used by the command line so `--source`/`--destination` work without a
/// config file.
pub fn load_with_paths(
    path: Option<&Path>,
    source_path: Option<PathBuf>,
    destination_path: Option<PathBuf>,
) -> Result<SaveTimeConfig> {
    let mut file = match path {
        Some(path) => read_file(path)?,
        None => match default_path().filter(|p| p.is_file()) {
            Some(path) => read_file(&path)?,
            None => {
                debug!("No config file found, using the environment only");
                ConfigFile::default()
            }
        },
    };
    file = file.with_overrides(|key| std::env::var(key).ok())?;
    if source_path.is_some() {
        file.source_path = source_path;
    }
    if destination_path.is_some() {
        file.destination_path = destination_path;
    }
    let config = file.finish()?;
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    debug!("Loading config from {:?}", path);
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// The config file as written, every key optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigFile {
    source_path: Option<PathBuf>,
    destination_path: Option<PathBuf>,
    retain: Option<usize>,
    auto_launch: Option<bool>,
    target_process: Option<String>,
    launch_command: Option<PathBuf>,
    #[serde(default)]
    launch_args: Vec<String>,
}

impl ConfigFile {
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var(ENV_SOURCE_PATH) {
            self.source_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var(ENV_DESTINATION_PATH) {
            self.destination_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var(ENV_RETAIN) {
            let retain = v.trim().parse().map_err(|_| {
                SaveTimeError::config(format!("{} must be a non-negative integer, got {:?}", ENV_RETAIN, v))
            })?;
            self.retain = Some(retain);
        }
        if let Some(v) = var(ENV_AUTO_LAUNCH) {
            self.auto_launch = Some(parse_flag(ENV_AUTO_LAUNCH, &v)?);
        }
        if let Some(v) = var(ENV_TARGET_PROCESS) {
            self.target_process = Some(v);
        }
        if let Some(v) = var(ENV_LAUNCH_COMMAND) {
            self.launch_command = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    fn finish(self) -> Result<SaveTimeConfig> {
        let source_path = self
            .source_path
            .ok_or_else(|| SaveTimeError::config(format!("source-path is not set ({})", ENV_SOURCE_PATH)))?;
        let destination_path = self.destination_path.ok_or_else(|| {
            SaveTimeError::config(format!("destination-path is not set ({})", ENV_DESTINATION_PATH))
        })?;
        Ok(SaveTimeConfig {
            source_path,
            destination_path,
            retain: self.retain,
            auto_launch: self.auto_launch.unwrap_or(false),
            target_process: self.target_process,
            launch_command: self.launch_command,
            launch_args: self.launch_args,
        })
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SaveTimeError::config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

impl SaveTimeConfig {
    /// Check the paths can be used together
    ///
    /// Rejects empty paths, a destination equal to the source, and a
    /// destination inside the source (every backup would copy the backups).
    pub fn validate(&self) -> Result<()> {
        validate_paths(&self.source_path, &self.destination_path, MARKER_SUFFIX)
    }
}

pub(crate) fn validate_paths(source: &Path, destination: &Path, marker_suffix: &str) -> Result<()> {
    if source.as_os_str().is_empty() {
        return Err(SaveTimeError::config("source-path is empty"));
    }
    if destination.as_os_str().is_empty() {
        return Err(SaveTimeError::config("destination-path is empty"));
    }
    if marker_suffix.is_empty() {
        return Err(SaveTimeError::config("marker suffix is empty"));
    }
    let source = normalize(source);
    let destination = normalize(destination);
    if source == destination {
        return Err(SaveTimeError::config(format!(
            "source-path and destination-path are both {:?}",
            source
        )));
    }
    if destination.starts_with(&source) {
        return Err(SaveTimeError::config(format!(
            "destination-path {:?} is inside source-path {:?}",
            destination, source
        )));
    }
    // A restore deletes the marker before anything else
    let marker = utils::with_suffix(&source, marker_suffix);
    if destination.starts_with(&marker) {
        return Err(SaveTimeError::config(format!(
            "destination-path {:?} would be deleted as the previous save {:?}",
            destination, marker
        )));
    }
    Ok(())
}

/// Absolute form with symlinks resolved as far as the path exists
///
/// The longest existing ancestor is canonicalized and the missing tail is
/// appended, so paths compare the same before and after they are created.
fn normalize(path: &Path) -> PathBuf {
    let absolute = lexical(&std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Drop `.` and fold `..` without touching the filesystem
fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
