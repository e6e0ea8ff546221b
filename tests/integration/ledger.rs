//! Integration tests for the progress ledger

use std::sync::Arc;

use crawl_engine::ledger::{LedgerError, ProgressLedger};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn test_ledger_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("datas").join(".progress.json");

    {
        let ledger = ProgressLedger::open(&path).unwrap();
        assert!(ledger.mark_completed("user-b").unwrap());
        assert!(ledger.mark_completed("user-a").unwrap());
        assert!(!ledger.mark_completed("user-a").unwrap());
    }

    let reopened = ProgressLedger::open(&path).unwrap();
    assert!(reopened.is_completed("user-a"));
    assert!(reopened.is_completed("user-b"));
    assert!(!reopened.is_completed("user-c"));
    assert_eq!(reopened.get_completed_ids(), vec!["user-a", "user-b"]);
    assert_eq!(reopened.get_completed_count(), 2);
}

#[test]
fn test_ledger_file_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let ledger = ProgressLedger::open(&path).unwrap();
    ledger.mark_batch_completed(["b", "a", "c"]).unwrap();

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let ids: Vec<&str> = raw["completed_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(raw["metadata"]["total_completed"], 3);
    assert!(raw["metadata"]["created_at"].is_string());
    assert!(raw["metadata"]["last_updated"].is_string());

    // No temp files left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
}

#[test]
fn test_ledger_reads_legacy_list() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    std::fs::write(&path, r#"["x", "y", "x"]"#).unwrap();

    let ledger = ProgressLedger::open(&path).unwrap();
    assert_eq!(ledger.get_completed_count(), 2);
    assert!(ledger.is_completed("x"));
}

#[test]
fn test_ledger_recovers_from_corruption() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    std::fs::write(&path, "{ not json").unwrap();

    let ledger = ProgressLedger::open(&path).unwrap();
    assert_eq!(ledger.get_completed_count(), 0);
    assert!(ledger.get_stats().corruption.is_some());

    ledger.mark_completed("fresh").unwrap();
    let reopened = ProgressLedger::open(&path).unwrap();
    assert!(reopened.is_completed("fresh"));
}

#[test]
fn test_ledger_rejects_directory_path() {
    let dir = TempDir::new().unwrap();
    let err = ProgressLedger::open(dir.path()).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPath(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_ledger_concurrent_writers_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let ledger = Arc::new(ProgressLedger::open(&path).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for i in 0..25 {
                    ledger.mark_completed(format!("w{worker}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ledger.get_completed_count(), 100);
    let reopened = ProgressLedger::open(&path).unwrap();
    assert_eq!(reopened.get_completed_count(), 100);
}

#[test]
fn test_ledger_clear_and_remove() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let ledger = ProgressLedger::open(&path).unwrap();
    ledger.mark_batch_completed(["a", "b"]).unwrap();

    assert!(ledger.remove_completed("a").unwrap());
    assert!(!ledger.remove_completed("a").unwrap());
    assert_eq!(ledger.get_completed_ids(), vec!["b"]);

    ledger.clear_progress().unwrap();
    let stats = ledger.get_stats();
    assert_eq!(stats.total_completed, 0);
    assert!(stats.cleared_at.is_some());
    assert_eq!(ProgressLedger::open(&path).unwrap().get_completed_count(), 0);
}
