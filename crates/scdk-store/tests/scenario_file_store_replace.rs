//! File-backed store: missing table, atomic replace, stale-version refusal.
//!
//! # Invariants under test
//!
//! 1. A missing history file reads as `table: None` with an absent version.
//! 2. Replace then read returns the written table and a new version.
//! 3. Re-encoding a decoded table reproduces the file byte for byte.
//! 4. A replace based on a stale version is refused and the file is untouched.
//! 5. Writers racing from the same version (absent or not): exactly one wins.

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::NaiveDate;
use scdk_reconcile::{EntityRow, HistorizedRow};
use scdk_store::*;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn one_row_table(key: &str, name: &str) -> HistoryTable {
    HistoryTable {
        attribute_columns: vec!["id".to_string(), "name".to_string()],
        rows: vec![HistorizedRow::open(
            key,
            d(2024, 1, 1),
            EntityRow::new().with("id", "1").with("name", name).attributes,
        )],
    }
}

#[test]
fn missing_history_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let ds = CsvDataset::new(dir.path());

    let loaded = ds.history_table("partners_history").read_history().unwrap();
    assert_eq!(loaded.table, None);
    assert_eq!(loaded.version, HistoryVersion::absent());
}

#[test]
fn missing_snapshot_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let ds = CsvDataset::new(dir.path());

    let err = ds.snapshot_table("partners").read_snapshot().unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));
    assert!(err.is_transient());
}

#[test]
fn replace_then_read_round_trips_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let ds = CsvDataset::new(dir.path());
    let hist = ds.history_table("h");

    hist.replace_history(&one_row_table("k1", "Acme"), &HistoryVersion::absent())
        .unwrap();
    let written = fs::read(hist.path()).unwrap();

    let loaded = hist.read_history().unwrap();
    assert!(loaded.version.as_deref().is_some());
    let table = loaded.table.unwrap();
    assert_eq!(table.rows[0].technical_key, "k1");

    hist.replace_history(&table, &loaded.version).unwrap();
    assert_eq!(fs::read(hist.path()).unwrap(), written);

    // no temp files left behind
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn stale_version_is_refused_and_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let ds = CsvDataset::new(dir.path());
    let hist = ds.history_table("h");

    hist.replace_history(&one_row_table("k1", "Acme"), &HistoryVersion::absent())
        .unwrap();
    let stale = hist.read_history().unwrap().version;

    // another run replaces the table
    hist.replace_history(&one_row_table("k2", "Globex"), &stale).unwrap();
    let after_other = fs::read(hist.path()).unwrap();

    let err = hist
        .replace_history(&one_row_table("k3", "Initech"), &stale)
        .unwrap_err();
    assert!(matches!(err, StoreError::ConcurrentModification { .. }));
    assert_eq!(fs::read(hist.path()).unwrap(), after_other);
}

/// Start `writers` threads that each replace the table from `expected`
/// at the same moment; returns how many replaces succeeded.
fn race(hist: &CsvHistoryTable, expected: &HistoryVersion, writers: usize) -> usize {
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let hist = hist.clone();
            let expected = expected.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let table = one_row_table(&format!("k{i}"), &format!("writer {i}"));
                barrier.wait();
                hist.replace_history(&table, &expected)
            })
        })
        .collect();

    let mut won = 0;
    for h in handles {
        match h.join().unwrap() {
            Ok(()) => won += 1,
            Err(e) => assert!(
                matches!(e, StoreError::ConcurrentModification { .. }),
                "unexpected error: {e}"
            ),
        }
    }
    won
}

#[test]
fn racing_first_runs_only_one_wins() {
    for _ in 0..50 {
        let dir = tempfile::tempdir().unwrap();
        let hist = CsvDataset::new(dir.path()).history_table("h");
        let absent = hist.read_history().unwrap().version;

        assert_eq!(race(&hist, &absent, 8), 1);

        let loaded = hist.read_history().unwrap();
        assert_eq!(loaded.table.unwrap().rows.len(), 1);
    }
}

#[test]
fn racing_replaces_from_same_version_only_one_wins() {
    for _ in 0..50 {
        let dir = tempfile::tempdir().unwrap();
        let hist = CsvDataset::new(dir.path()).history_table("h");
        hist.replace_history(&one_row_table("k0", "seed"), &HistoryVersion::absent())
            .unwrap();
        let shared = hist.read_history().unwrap().version;

        assert_eq!(race(&hist, &shared, 8), 1);
        assert_ne!(hist.read_history().unwrap().version, shared);
    }
}

#[test]
fn lock_file_sits_next_to_table() {
    let dir = tempfile::tempdir().unwrap();
    let hist = CsvDataset::new(dir.path()).history_table("partners_history");
    hist.replace_history(&one_row_table("k1", "Acme"), &HistoryVersion::absent())
        .unwrap();

    assert_eq!(hist.lock_path(), dir.path().join("partners_history.csv.lock"));
    assert!(hist.lock_path().exists());
}

#[test]
fn replace_creates_dataset_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ds = CsvDataset::new(dir.path().join("nested").join("crm"));
    let hist = ds.history_table("h");

    hist.replace_history(&one_row_table("k1", "Acme"), &HistoryVersion::absent())
        .unwrap();
    assert!(hist.path().exists());
}
