//! Capabilities the orchestrators call into but do not implement
//!
//! Two seams: "is the target process running" ([`TargetProbe`]) and "launch
//! the target process" ([`Launcher`]). Both are trait objects so callers can
//! plug in their own; closures `Fn() -> bool` work as probes directly.
//!
//! The bundled implementations cover the common cases:
//!
//! - [`ProcessProbe`] looks a process up by executable name
//! - [`NeverRunning`] always reports the target as stopped
//! - [`CommandLauncher`] starts a program with [`std::process::Command`]
//! - [`NoLauncher`] fails every launch (auto-launch enabled, nothing configured)

use crate::error::{Result, SaveTimeError};
use crate::types::ExecutionMode;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::{Child, Command};
use tracing::{debug, info, warn};

/// Answers whether the target process is currently running
pub trait TargetProbe: Send + Sync {
    /// `true` if the target is running and the save directory must not be touched
    fn is_running(&self) -> bool;
}

impl<F> TargetProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_running(&self) -> bool {
        self()
    }
}

/// Starts the target process after a restore
pub trait Launcher: Send + Sync {
    /// Launch the target; `Blocking` waits for it to exit
    fn launch(&self, mode: ExecutionMode) -> Result<()>;
}

/// Probe that never reports the target as running
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRunning;

impl TargetProbe for NeverRunning {
    fn is_running(&self) -> bool {
        false
    }
}

/// Probe matching running processes by executable name
///
/// The comparison ignores ASCII case and a trailing `.exe`, so `noita.exe`
/// matches a Linux `noita` process as well as the Windows image name.
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    name: String,
}

impl ProcessProbe {
    /// Probe for processes named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn normalized(name: &str) -> String {
        let lower = name.trim().to_ascii_lowercase();
        lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
    }

    fn matches(&self, candidate: &str) -> bool {
        Self::normalized(candidate) == Self::normalized(&self.name)
    }

    #[cfg(target_os = "linux")]
    fn scan(&self) -> std::io::Result<bool> {
        for entry in std::fs::read_dir("/proc")? {
            let entry = entry?;
            let is_pid = entry
                .file_name()
                .to_str()
                .map(|n| n.bytes().all(|b| b.is_ascii_digit()))
                .unwrap_or(false);
            if !is_pid {
                continue;
            }
            // Processes can exit between read_dir and read
            if let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) {
                if self.matches(&comm) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    #[cfg(windows)]
    fn scan(&self) -> std::io::Result<bool> {
        let output = Command::new("tasklist")
            .args(["/FO", "CSV", "/NH"])
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| line.split(',').next())
            .any(|image| self.matches(image.trim_matches('"'))))
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn scan(&self) -> std::io::Result<bool> {
        let output = Command::new("ps").args(["-A", "-o", "comm="]).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().any(|line| {
            let base = line.rsplit('/').next().unwrap_or(line);
            self.matches(base)
        }))
    }
}

impl TargetProbe for ProcessProbe {
    fn is_running(&self) -> bool {
        match self.scan() {
            Ok(running) => {
                debug!(process = %self.name, running, "Probed target process");
                running
            }
            Err(e) => {
                warn!("Could not list processes, assuming {} is not running: {}", self.name, e);
                false
            }
        }
    }
}

/// Launcher used when auto-launch is enabled without a launch command
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLauncher;

impl Launcher for NoLauncher {
    fn launch(&self, _mode: ExecutionMode) -> Result<()> {
        Err(SaveTimeError::launcher("no launch command configured"))
    }
}

/// Launches a program with fixed arguments
///
/// Background launches keep the child handle so finished children are
/// reaped on the next launch.
#[derive(Debug)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
    children: Mutex<Vec<Child>>,
}

impl CommandLauncher {
    /// Launch `program` with `args`
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Number of background children not yet observed to exit
    pub fn running_children(&self) -> usize {
        let mut children = self.children.lock();
        children.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
        children.len()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = self.program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        command
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, mode: ExecutionMode) -> Result<()> {
        info!("Launching {:?}", self.program);
        match mode {
            ExecutionMode::Blocking => {
                let status = self
                    .command()
                    .status()
                    .map_err(|e| SaveTimeError::launcher(format!("{:?}: {}", self.program, e)))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SaveTimeError::launcher(format!(
                        "{:?} exited with {}",
                        self.program, status
                    )))
                }
            }
            ExecutionMode::Background => {
                let child = self
                    .command()
                    .spawn()
                    .map_err(|e| SaveTimeError::launcher(format!("{:?}: {}", self.program, e)))?;
                debug!(pid = child.id(), "Launched in background");
                let mut children = self.children.lock();
                children.retain_mut(|c| matches!(c.try_wait(), Ok(None)));
                children.push(child);
                Ok(())
            }
        }
    }
}
