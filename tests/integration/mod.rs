//! Integration tests for SaveTime
//!
//! Backup and restore scenarios run against real temporary directories,
//! including the guard behavior under concurrency and the collaborator seams.

use ::savetime::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Test harness owning a live directory, a backup root and a private guard
pub struct SaveTimeTestHarness {
    pub temp_dir: TempDir,
    pub live: PathBuf,
    pub backups: PathBuf,
    pub phase: Arc<PhaseTracker>,
}

impl SaveTimeTestHarness {
    /// Create a harness with nothing on disk yet
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let live = temp_dir.path().join("save00");
        let backups = temp_dir.path().join("backups");
        Self {
            temp_dir,
            live,
            backups,
            phase: Arc::new(PhaseTracker::new()),
        }
    }

    /// Builder wired to this harness's guard
    pub fn builder(&self) -> SaveTimeBuilder {
        SaveTimeBuilder::new().phase(self.phase.clone())
    }

    /// Facade with default collaborators
    pub fn savetime(&self) -> SaveTime {
        self.builder().build(&self.live, &self.backups).unwrap()
    }

    /// Write `content` at `relative` under the live directory
    pub fn write_live(&self, relative: &str, content: &[u8]) {
        write_file(&self.live.join(relative), content);
    }

    /// Create a snapshot directory by hand with a single marker file
    pub fn add_snapshot(&self, name: &str) {
        write_file(&self.backups.join(name).join("snapshot.txt"), name.as_bytes());
    }

    /// Names of snapshots currently in the catalog
    pub fn snapshot_names(&self) -> Vec<String> {
        SnapshotCatalog::new(&self.backups)
            .list_or_empty()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect()
    }
}

impl Default for SaveTimeTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a file, creating parents
pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Relative path -> content of every regular file below `root`
pub fn read_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex};
    use std::thread;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Launcher recording the mode of every call
    #[derive(Default)]
    struct RecordingLauncher {
        modes: Mutex<Vec<ExecutionMode>>,
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, mode: ExecutionMode) -> Result<()> {
            self.modes.lock().unwrap().push(mode);
            Ok(())
        }
    }

    #[test]
    #[traced_test]
    fn test_restore_picks_latest_of_three() {
        let harness = SaveTimeTestHarness::new();
        harness.add_snapshot("2024-03-01-10-00-00");
        harness.add_snapshot("2024-03-01-10-00-02");
        harness.add_snapshot("2024-03-01-10-00-01");

        let savetime = harness.savetime();
        let report = savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        assert_eq!(report.snapshot.name, "2024-03-01-10-00-02");
        assert_eq!(
            fs::read_to_string(harness.live.join("snapshot.txt")).unwrap(),
            "2024-03-01-10-00-02"
        );
        assert_eq!(savetime.phase(), Phase::Stopped);
    }

    #[test]
    fn test_restore_with_no_snapshots_leaves_live_untouched() {
        let harness = SaveTimeTestHarness::new();
        harness.write_live("player.xml", b"<player/>");
        fs::create_dir_all(&harness.backups).unwrap();
        let before = read_tree(&harness.live);

        let savetime = harness.savetime();
        let result = savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap();

        assert!(matches!(result, Err(SaveTimeError::NoSnapshots(_))));
        assert_eq!(read_tree(&harness.live), before);
        assert!(!savetime.marker_path().exists());
        assert_eq!(harness.phase.phase(), Phase::Stopped);
    }

    #[test]
    fn test_missing_live_and_empty_root_creates_nothing() {
        let harness = SaveTimeTestHarness::new();

        let result = harness.savetime().restore_latest(ExecutionMode::Blocking).wait().unwrap();

        assert!(matches!(result, Err(SaveTimeError::NoSnapshots(_))));
        assert_eq!(harness.phase.phase(), Phase::Stopped);
        assert!(!harness.live.exists());
        assert!(!harness.backups.exists());
        assert_eq!(fs::read_dir(harness.temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_target_running_blocks_everything() {
        let harness = SaveTimeTestHarness::new();
        harness.write_live("player.xml", b"<player/>");
        harness.add_snapshot("2024-03-01-10-00-00");
        let before_live = read_tree(&harness.live);
        let before_backups = read_tree(&harness.backups);

        let probe_calls = Arc::new(AtomicUsize::new(0));
        let calls = probe_calls.clone();
        let savetime = harness
            .builder()
            .probe(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            }))
            .build(&harness.live, &harness.backups)
            .unwrap();

        let restore = savetime.restore_latest(ExecutionMode::Blocking);
        let backup = savetime.backup_with_retention(ExecutionMode::Background, Some(0));

        assert_eq!(restore.skip_reason(), Some(SkipReason::TargetRunning));
        assert_eq!(backup.skip_reason(), Some(SkipReason::TargetRunning));
        assert_eq!(probe_calls.load(Ordering::SeqCst), 2);
        assert_eq!(read_tree(&harness.live), before_live);
        assert_eq!(read_tree(&harness.backups), before_backups);
        assert!(!savetime.marker_path().exists());
        assert_eq!(harness.phase.phase(), Phase::Stopped);
    }

    #[test]
    fn test_backup_retains_two_most_recent() {
        let harness = SaveTimeTestHarness::new();
        harness.write_live("player.xml", b"<player/>");
        for second in 1..=5 {
            harness.add_snapshot(&format!("2020-06-01-00-00-0{}", second));
        }

        let report = harness
            .builder()
            .retain(Some(2))
            .build(&harness.live, &harness.backups)
            .unwrap()
            .backup(ExecutionMode::Blocking)
            .wait()
            .unwrap()
            .unwrap();

        assert_eq!(
            harness.snapshot_names(),
            vec!["2020-06-01-00-00-05".to_string(), report.snapshot.name.clone()]
        );
        let pruned: Vec<_> = report.pruned.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            pruned,
            vec![
                "2020-06-01-00-00-01",
                "2020-06-01-00-00-02",
                "2020-06-01-00-00-03",
                "2020-06-01-00-00-04"
            ]
        );
    }

    #[test]
    fn test_backup_then_restore_reproduces_live_exactly() {
        let harness = SaveTimeTestHarness::new();
        harness.write_live("player.xml", b"<player hp=\"42\"/>");
        harness.write_live("world/region/r.0.0.bin", &[0xAB; 8192]);
        harness.write_live("world/empty.dat", b"");
        fs::create_dir_all(harness.live.join("mods/disabled")).unwrap();
        let original = read_tree(&harness.live);

        let savetime = harness.savetime();
        savetime.backup(ExecutionMode::Blocking).wait().unwrap().unwrap();
        savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        assert_eq!(read_tree(&harness.live), original);
        assert!(harness.live.join("mods/disabled").is_dir());
        assert_eq!(read_tree(&savetime.marker_path()), original);
    }

    #[test]
    fn test_repeated_restores_replace_the_marker() {
        let harness = SaveTimeTestHarness::new();
        harness.add_snapshot("2024-03-01-10-00-00");
        harness.write_live("generation.txt", b"0");
        let savetime = harness.savetime();

        for generation in 1..=3 {
            harness.write_live("generation.txt", generation.to_string().as_bytes());
            savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();
            assert_eq!(
                fs::read_to_string(savetime.marker_path().join("generation.txt")).unwrap(),
                generation.to_string()
            );
        }
    }

    #[test]
    fn test_launcher_receives_the_execution_mode() {
        let harness = SaveTimeTestHarness::new();
        harness.add_snapshot("2024-03-01-10-00-00");
        let launcher = Arc::new(RecordingLauncher::default());
        let savetime = harness
            .builder()
            .launcher(launcher.clone())
            .auto_launch(true)
            .build(&harness.live, &harness.backups)
            .unwrap();

        let blocking = savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();
        let background = savetime.restore_latest(ExecutionMode::Background).wait().unwrap().unwrap();

        assert_eq!(blocking.launch, LaunchStatus::Launched);
        assert_eq!(background.launch, LaunchStatus::Launched);
        assert_eq!(
            *launcher.modes.lock().unwrap(),
            vec![ExecutionMode::Blocking, ExecutionMode::Background]
        );
    }

    #[test]
    fn test_auto_launch_without_launcher_still_restores() {
        let harness = SaveTimeTestHarness::new();
        harness.add_snapshot("2024-03-01-10-00-00");
        let savetime = harness
            .builder()
            .auto_launch(true)
            .build(&harness.live, &harness.backups)
            .unwrap();

        let report = savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        assert!(matches!(report.launch, LaunchStatus::Failed(_)));
        assert!(harness.live.join("snapshot.txt").exists());
        assert_eq!(harness.phase.phase(), Phase::Stopped);
    }

    #[test]
    fn test_concurrent_try_begin_has_one_winner() {
        for _ in 0..100 {
            let phase = Arc::new(PhaseTracker::new());
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let phase = phase.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        phase.try_begin()
                    })
                })
                .collect();
            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
            assert_eq!(phase.phase(), Phase::Started);
        }
    }

    #[test]
    fn test_request_during_background_operation_is_dropped() {
        let harness = SaveTimeTestHarness::new();
        harness.add_snapshot("2024-03-01-10-00-00");
        // Enough data that the background copy is still running when we ask again
        for i in 0..200 {
            harness.write_live(&format!("chunks/{}.bin", i), &[i as u8; 4096]);
        }
        let savetime = harness.savetime();

        let first = savetime.backup(ExecutionMode::Background);
        let second = savetime.restore_latest(ExecutionMode::Blocking);

        match first {
            Dispatch::Detached(handle) => {
                if second.is_skipped() {
                    assert_eq!(second.skip_reason(), Some(SkipReason::Busy));
                }
                handle.wait().unwrap();
            }
            other => panic!("expected a detached backup, got {:?}", other.skip_reason()),
        }
        assert_eq!(harness.phase.phase(), Phase::Stopped);
    }

    #[test]
    fn test_dropped_handle_still_completes() {
        let harness = SaveTimeTestHarness::new();
        harness.write_live("player.xml", b"<player/>");
        let savetime = harness.savetime();

        drop(savetime.backup(ExecutionMode::Background));

        for _ in 0..500 {
            if harness.phase.is_stopped() && harness.snapshot_names().len() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(harness.snapshot_names().len(), 1);
        assert!(harness.phase.is_stopped());
    }

    #[tokio::test]
    async fn test_background_restore_completion_future() {
        let harness = SaveTimeTestHarness::new();
        harness.add_snapshot("2024-03-01-10-00-00");
        let savetime = harness.savetime();

        let report = savetime
            .restore_latest(ExecutionMode::Background)
            .completion()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.snapshot.name, "2024-03-01-10-00-00");
        assert_eq!(harness.phase.phase(), Phase::Stopped);
    }
}
