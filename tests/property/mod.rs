//! Property-based testing for SaveTime
//!
//! Uses proptest to verify catalog ordering, retention planning and the
//! backup/restore round trip across randomly generated inputs.

use ::savetime::catalog::{snapshot_name, TIMESTAMP_FORMAT};
use ::savetime::*;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Directory names that must never be listed as snapshots
const JUNK_NAMES: &[&str] = &[
    "notes",
    "save00.bak",
    "2024-13-01-00-00-00",
    "2024-02-30-00-00-00",
    "2024-1-1-0-0-0",
    "2024-01-01 00:00:00",
    "2024-01-01-00-00-00-old",
    "20240101000000",
];

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// Distinct second offsets from 2020-01-01
fn offsets_strategy() -> impl Strategy<Value = BTreeSet<i64>> {
    prop::collection::btree_set(0i64..200_000_000, 0..25)
}

/// Files below a few fixed directories; `.dat` keeps file and directory names apart
fn tree_strategy() -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    let dirs = prop::sample::select(vec!["", "world", "world/region", "mods/enabled"]);
    let file = (dirs, "[a-z0-9_]{1,10}").prop_map(|(dir, name)| {
        PathBuf::from(dir).join(format!("{}.dat", name))
    });
    prop::collection::btree_map(file, prop::collection::vec(any::<u8>(), 0..2048), 1..20)
}

fn snapshot_at(offset: i64) -> Snapshot {
    let timestamp = base_time() + Duration::seconds(offset);
    Snapshot {
        name: snapshot_name(timestamp),
        timestamp,
        path: PathBuf::from(snapshot_name(timestamp)),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Listing is strictly ascending and contains exactly the well-formed names
    #[test]
    fn catalog_lists_only_snapshots_in_order(
        offsets in offsets_strategy(),
        junk in prop::sample::subsequence(JUNK_NAMES.to_vec(), 0..JUNK_NAMES.len()),
    ) {
        let temp = TempDir::new().unwrap();
        for offset in &offsets {
            let name = (base_time() + Duration::seconds(*offset)).format(TIMESTAMP_FORMAT).to_string();
            fs::create_dir_all(temp.path().join(name)).unwrap();
        }
        for name in &junk {
            fs::create_dir_all(temp.path().join(name)).unwrap();
        }

        let listed = SnapshotCatalog::new(temp.path()).list().unwrap();

        prop_assert_eq!(listed.len(), offsets.len());
        for pair in listed.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
            prop_assert!(pair[0].name < pair[1].name);
        }
        for snapshot in &listed {
            prop_assert!(!junk.contains(&snapshot.name.as_str()));
        }
    }

    /// Pruning keeps the newest `retain` and deletes everything older
    #[test]
    fn plan_prune_removes_only_the_oldest(
        offsets in offsets_strategy(),
        retain in 0usize..30,
    ) {
        let snapshots: Vec<_> = offsets.iter().rev().map(|o| snapshot_at(*o)).collect();

        let doomed = SnapshotCatalog::plan_prune(&snapshots, retain);

        prop_assert_eq!(doomed.len(), snapshots.len().saturating_sub(retain));
        let kept: Vec<_> = snapshots.iter().filter(|s| !doomed.contains(s)).collect();
        prop_assert_eq!(kept.len(), snapshots.len().min(retain));
        for pruned in &doomed {
            for survivor in &kept {
                prop_assert!(pruned.timestamp < survivor.timestamp);
            }
        }
        for pair in doomed.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    /// Selecting `Latest` always yields the maximum timestamp
    #[test]
    fn select_latest_is_maximum(offsets in offsets_strategy()) {
        let snapshots: Vec<_> = offsets.iter().map(|o| snapshot_at(*o)).collect();

        let selected = SnapshotCatalog::select(&snapshots, &SnapshotSelector::Latest);

        prop_assert_eq!(selected.map(|s| s.timestamp), snapshots.iter().map(|s| s.timestamp).max());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Backup then restore reproduces the live directory byte for byte
    #[test]
    fn backup_restore_round_trip(
        original in tree_strategy(),
        clobber in tree_strategy(),
    ) {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("save00");
        for (relative, content) in &original {
            let path = live.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let savetime = SaveTimeBuilder::new()
            .phase(Arc::new(PhaseTracker::new()))
            .build(&live, temp.path().join("backups"))
            .unwrap();

        savetime.backup(ExecutionMode::Blocking).wait().unwrap().unwrap();
        for (relative, content) in &clobber {
            let path = live.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        savetime.restore_latest(ExecutionMode::Blocking).wait().unwrap().unwrap();

        let restored = crate::integration::read_tree(&live);
        prop_assert_eq!(restored, original);
        prop_assert_eq!(savetime.phase(), Phase::Stopped);
    }
}
