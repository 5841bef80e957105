//! Main test module for SaveTime
//!
//! This module includes all test suites:
//! - Integration tests for backup and restore scenarios
//! - Property-based tests for catalog and round-trip invariants
//! - Edge cases around unusual directory contents

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::savetime::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open(temp: &TempDir) -> SaveTime {
        SaveTimeBuilder::new()
            .phase(Arc::new(PhaseTracker::new()))
            .build(temp.path().join("save00"), temp.path().join("backups"))
            .unwrap()
    }

    #[test]
    fn test_empty_live_directory() {
        let temp = TempDir::new().unwrap();
        let savetime = open(&temp);
        fs::create_dir_all(savetime.live()).unwrap();

        let backup = savetime.backup(ExecutionMode::Blocking).wait().unwrap().unwrap();
        assert_eq!(backup.copied.files, 0);

        fs::write(savetime.live().join("new.txt"), "content").unwrap();
        savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        assert!(savetime.live().is_dir());
        assert!(!savetime.live().join("new.txt").exists());
    }

    #[test]
    fn test_special_filenames() {
        let temp = TempDir::new().unwrap();
        let savetime = open(&temp);
        fs::create_dir_all(savetime.live()).unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.multiple.dots.txt",
            "UPPERCASE.TXT",
            "ünïcödé.txt",
            ".hidden",
        ];
        for name in &special_names {
            fs::write(savetime.live().join(name), name.as_bytes()).unwrap();
        }

        savetime.backup(ExecutionMode::Blocking).wait().unwrap().unwrap();
        fs::remove_dir_all(savetime.live()).unwrap();
        savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        for name in &special_names {
            assert_eq!(fs::read(savetime.live().join(name)).unwrap(), name.as_bytes());
        }
    }

    #[test]
    fn test_foreign_entries_in_backup_root_are_ignored() {
        let temp = TempDir::new().unwrap();
        let savetime = open(&temp);
        let root = savetime.backup_root().to_path_buf();
        fs::create_dir_all(root.join("2024-01-01-00-00-01")).unwrap();
        fs::write(root.join("2024-01-01-00-00-01/a.txt"), "real").unwrap();
        fs::create_dir_all(root.join("my old saves")).unwrap();
        fs::create_dir_all(root.join("2024-1-1-0-0-9")).unwrap();
        fs::write(root.join("2099-01-01-00-00-00"), "a file, not a directory").unwrap();

        let names: Vec<_> = savetime.list_snapshots().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["2024-01-01-00-00-01".to_string()]);

        savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();
        assert_eq!(fs::read_to_string(savetime.live().join("a.txt")).unwrap(), "real");
    }

    #[test]
    fn test_unknown_snapshot_name_falls_back_to_latest() {
        let temp = TempDir::new().unwrap();
        let savetime = open(&temp);
        let root = savetime.backup_root().to_path_buf();
        for name in ["2024-01-01-00-00-01", "2024-01-01-00-00-02"] {
            fs::create_dir_all(root.join(name)).unwrap();
            fs::write(root.join(name).join("which.txt"), name).unwrap();
        }

        let report = savetime
            .restore(
                SnapshotSelector::ByName("1999-01-01-00-00-00".into()),
                ExecutionMode::Blocking,
            )
            .wait()
            .unwrap()
            .unwrap();

        assert_eq!(report.snapshot.name, "2024-01-01-00-00-02");
    }

    #[test]
    fn test_nested_live_parent_is_created() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("backups");
        fs::create_dir_all(root.join("2024-01-01-00-00-01/world")).unwrap();
        fs::write(root.join("2024-01-01-00-00-01/world/x"), "x").unwrap();
        let savetime = SaveTimeBuilder::new()
            .phase(Arc::new(PhaseTracker::new()))
            .build(temp.path().join("a/b/c/save00"), &root)
            .unwrap();

        let report = savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        assert!(!report.rotated);
        assert_eq!(fs::read_to_string(savetime.live().join("world/x")).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_survive_round_trip() {
        let temp = TempDir::new().unwrap();
        let savetime = open(&temp);
        fs::create_dir_all(savetime.live()).unwrap();
        fs::write(savetime.live().join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink("target.txt", savetime.live().join("link.txt")).unwrap();

        savetime.backup(ExecutionMode::Blocking).wait().unwrap().unwrap();
        savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        let link = savetime.live().join("link.txt");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(link).unwrap(), "t");
    }
}
