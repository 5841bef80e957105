//! # SaveTime CLI - Backups for a single save directory
//!
//! Command-line front end for the savetime library.
//!
//! ## Features
//! - Snapshot the save directory, keeping the N most recent backups
//! - Restore the latest or a named backup (the old save is kept as `<save>.bak`)
//! - Refuse to run while the game is running, launch it after a restore
//! - Inspect backups and leftovers of interrupted operations
//!
//! ## Usage
//! ```bash
//! # Back up, keeping five snapshots
//! savetime --source ~/save00 --destination ~/backups backup --keep 5
//!
//! # Restore the most recent backup and start the game
//! savetime restore --launch
//!
//! # List backups
//! savetime list
//! ```

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use savetime::{
    config, BackupReport, Dispatch, ExecutionMode, LaunchStatus, RestoreReport, SaveTime,
    SaveTimeBuilder, SaveTimeConfig, SnapshotSelector,
};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// SaveTime CLI - Phase-guarded backups of a save directory
#[derive(Parser)]
#[command(name = "savetime")]
#[command(author, version)]
#[command(about = "Back up and restore a save directory with timestamped snapshots")]
#[command(long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.savetime.json)
    #[arg(short, long, global = true, env = "SAVETIME_CONFIG")]
    config: Option<PathBuf>,

    /// Save directory to protect
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    /// Directory holding the backups
    #[arg(short, long, global = true)]
    destination: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot the save directory
    #[command(alias = "b")]
    Backup {
        /// Keep at most this many backups afterwards
        #[arg(short, long)]
        keep: Option<usize>,

        /// Run on a worker thread and show a spinner
        #[arg(long)]
        background: bool,
    },

    /// Replace the save directory with a backup
    #[command(alias = "r")]
    Restore {
        /// Backup name (defaults to the latest)
        #[arg(long)]
        snapshot: Option<String>,

        /// Launch the game afterwards
        #[arg(long)]
        launch: bool,

        /// Run on a worker thread and show a spinner
        #[arg(long)]
        background: bool,
    },

    /// List backups, oldest first
    #[command(alias = "ls")]
    List {
        /// Show only the most recent N
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show paths, backups and any interrupted operation
    Status,

    /// Delete the oldest backups
    Prune {
        /// Number of backups to keep
        #[arg(short, long)]
        keep: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_filter = if cli.verbose { "savetime=debug" } else { "savetime=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Run command
    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_with_paths(cli.config.as_deref(), cli.source, cli.destination)
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Backup { keep, background } => cmd_backup(&config, keep, background),
        Commands::Restore {
            snapshot,
            launch,
            background,
        } => cmd_restore(&config, snapshot, launch, background),
        Commands::List { limit } => cmd_list(&config, limit),
        Commands::Status => cmd_status(&config),
        Commands::Prune { keep } => cmd_prune(&config, keep),
    }
}

/// Snapshot the save directory
///
/// `--keep` overrides the configured retention count for this run.
fn cmd_backup(config: &SaveTimeConfig, keep: Option<usize>, background: bool) -> anyhow::Result<()> {
    let savetime = open_savetime(config, config.auto_launch)?;
    let retain = keep.or(config.retain);

    println!("{}", "Backing up...".blue().bold());
    let dispatch = savetime.backup_with_retention(ExecutionMode::from_background(background), retain);
    let report: BackupReport = finish(dispatch, "Copying save directory...")?;

    println!(
        "{} Created backup {}",
        "✓".green().bold(),
        report.snapshot.name.yellow().bold()
    );
    println!("  Files: {}", report.copied.files.to_string().cyan());
    println!("  Size: {}", format_bytes(report.copied.bytes).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
    if !report.pruned.is_empty() {
        println!("  Pruned: {}", report.pruned.len().to_string().yellow());
        for snapshot in &report.pruned {
            println!("    {} {}", "-".red(), snapshot.name.dimmed());
        }
    }
    Ok(())
}

/// Replace the save directory with a backup
///
/// The previous save directory is kept next to it with a `.bak` suffix until
/// the next restore.
fn cmd_restore(
    config: &SaveTimeConfig,
    snapshot: Option<String>,
    launch: bool,
    background: bool,
) -> anyhow::Result<()> {
    let savetime = open_savetime(config, config.auto_launch || launch)?;
    let selector = SnapshotSelector::from(snapshot);

    println!("{}", "Restoring...".blue().bold());
    let dispatch = savetime.restore(selector, ExecutionMode::from_background(background));
    let report: RestoreReport = finish(dispatch, "Copying backup into place...")?;

    println!(
        "{} Restored backup {}",
        "✓".green().bold(),
        report.snapshot.name.yellow().bold()
    );
    println!("  Files: {}", report.copied.files.to_string().cyan());
    println!("  Size: {}", format_bytes(report.copied.bytes).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
    if report.rotated {
        println!(
            "  Previous save: {}",
            savetime.marker_path().display().to_string().dimmed()
        );
    }
    match report.launch {
        LaunchStatus::NotRequested => {}
        LaunchStatus::Launched => println!("  {} Launched game", "✓".green()),
        LaunchStatus::Failed(reason) => println!("  {} Launch failed: {}", "⚠".yellow(), reason),
    }
    Ok(())
}

/// List backups
fn cmd_list(config: &SaveTimeConfig, limit: Option<usize>) -> anyhow::Result<()> {
    let savetime = open_savetime(config, false)?;
    let snapshots = savetime.list_snapshots()?;

    if snapshots.is_empty() {
        println!("{}", "No backups found".yellow());
        return Ok(());
    }

    let skip = limit.map_or(0, |n| snapshots.len().saturating_sub(n));
    println!("{}", format!("Backups in {}", savetime.backup_root().display()).bold());
    let now = Local::now().naive_local();
    let latest = snapshots.len() - 1;
    for (i, snapshot) in snapshots.iter().enumerate().skip(skip) {
        let age = (now - snapshot.timestamp)
            .to_std()
            .map(|d| format!("{} ago", format_duration(Duration::from_secs(d.as_secs()))))
            .unwrap_or_else(|_| "in the future".to_string());
        let marker = if i == latest { "*".green().bold() } else { " ".normal() };
        println!("{} {}  {}", marker, snapshot.name.yellow(), age.dimmed());
    }
    println!("\nTotal: {} backups", snapshots.len().to_string().cyan());
    Ok(())
}

/// Show paths, backups and any interrupted operation
fn cmd_status(config: &SaveTimeConfig) -> anyhow::Result<()> {
    let savetime = open_savetime(config, false)?;
    let snapshots = savetime.list_snapshots()?;

    println!("{}", "SaveTime Status".bold());
    println!("  Save: {} {}", savetime.live().display().to_string().cyan(), presence(savetime.live().is_dir()));
    println!(
        "  Previous save: {} {}",
        savetime.marker_path().display().to_string().cyan(),
        presence(savetime.marker_path().exists())
    );
    println!("  Backups: {}", savetime.backup_root().display().to_string().cyan());
    println!("  Count: {}", snapshots.len().to_string().cyan());
    if let Some(latest) = snapshots.last() {
        println!("  Latest: {}", latest.name.yellow());
    }
    match config.retain {
        Some(retain) => println!("  Retain: {}", retain.to_string().cyan()),
        None => println!("  Retain: {}", "all".cyan()),
    }
    if let Some(process) = &config.target_process {
        println!("  Game process: {}", process.cyan());
    }

    if let Some(entry) = savetime.pending_journal()? {
        println!(
            "\n{} Interrupted {} of {} (started {})",
            "⚠".yellow(),
            entry.kind.to_string().yellow().bold(),
            entry.snapshot.yellow(),
            entry.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let steps: Vec<_> = entry.completed.iter().map(|s| s.as_str()).collect();
        if steps.is_empty() {
            println!("  Completed steps: {}", "none".dimmed());
        } else {
            println!("  Completed steps: {}", steps.join(", ").dimmed());
        }
        println!("  Check the save directory, then run the operation again.");
    }
    Ok(())
}

/// Delete the oldest backups
fn cmd_prune(config: &SaveTimeConfig, keep: usize) -> anyhow::Result<()> {
    let savetime = open_savetime(config, false)?;
    let pruned = finish(savetime.prune(keep), "Pruning...")?;

    if pruned.is_empty() {
        println!("{}", "Nothing to prune".green());
    } else {
        println!("{} Deleted {} backups", "✓".green().bold(), pruned.len().to_string().yellow());
        for snapshot in &pruned {
            println!("  {} {}", "-".red(), snapshot.name.dimmed());
        }
    }
    Ok(())
}

/// Build the facade for `config`
fn open_savetime(config: &SaveTimeConfig, auto_launch: bool) -> anyhow::Result<SaveTime> {
    SaveTimeBuilder::from_config(config)
        .auto_launch(auto_launch)
        .build(&config.source_path, &config.destination_path)
        .context("Invalid configuration")
}

/// Wait for a dispatched operation, with a spinner for background runs
fn finish<T: Send + 'static>(dispatch: Dispatch<T>, message: &'static str) -> anyhow::Result<T> {
    let result = match dispatch {
        Dispatch::Skipped(reason) => bail!("Nothing done: {}", reason),
        Dispatch::Finished(result) => result,
        Dispatch::Detached(handle) => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(message);
            pb.enable_steady_tick(Duration::from_millis(100));
            while !handle.is_finished() {
                thread::sleep(Duration::from_millis(50));
            }
            pb.finish_and_clear();
            handle.wait()
        }
    };
    Ok(result?)
}

fn presence(exists: bool) -> ColoredString {
    if exists {
        "(present)".green()
    } else {
        "(missing)".red()
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
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
