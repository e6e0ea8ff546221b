use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crawl_engine::crawler::TargetStatus;
use crawl_engine::fetcher::{from_fn, CollectionEnd, Page};
use crawl_engine::{BatchRunner, CrawlError, PaginatedCollector, ProgressLedger, ShutdownCoordinator};
use tempfile::TempDir;

#[tokio::test]
async fn shutdown_notifies_waiters() {
    let shutdown = ShutdownCoordinator::shared();
    let waiter = {
        let handle = shutdown.clone();
        tokio::spawn(async move {
            handle.wait_for_shutdown().await;
            true
        })
    };

    // Give the task time to start waiting
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok());
}

/// Shutdown requested before the wait starts must not be missed.
#[tokio::test]
async fn shutdown_race_condition_no_deadlock() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let handle = shutdown.clone();
    let waiter = tokio::spawn(async move {
        handle.wait_for_shutdown().await;
        true
    });

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok(), "wait_for_shutdown() deadlocked despite shutdown already requested");
}

/// A crawl interrupted between pages keeps what it collected, leaves the
/// target out of the ledger, and a rerun picks it up.
#[tokio::test(start_paused = true)]
async fn interrupted_target_is_not_marked_completed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let shutdown = ShutdownCoordinator::shared();
    let fetches = Arc::new(AtomicUsize::new(0));

    let source = {
        let shutdown = shutdown.clone();
        let fetches = Arc::clone(&fetches);
        from_fn(move |_target: String, page: u32| {
            let n = fetches.fetch_add(1, Ordering::SeqCst);
            // Ctrl+C arrives while the second page is in flight
            if n == 1 {
                shutdown.request_shutdown();
            }
            async move { Ok::<_, CrawlError>(Page::next(vec![page], page + 1)) }
        })
    };
    let collector = PaginatedCollector::new(source).with_shutdown(shutdown.clone());
    let ledger = Arc::new(ProgressLedger::open(&path).unwrap());
    let runner = BatchRunner::new(collector)
        .with_concurrency(1)
        .with_ledger(Arc::clone(&ledger))
        .with_shutdown(shutdown.clone());

    let summary = runner.run(["slow", "never-started"]).await;

    assert_eq!(summary.cancelled, 2);
    assert!(!summary.is_success());
    let slow = &summary.results[0];
    assert_eq!(slow.status, TargetStatus::Cancelled);
    assert_eq!(slow.end, Some(CollectionEnd::Cancelled));
    assert_eq!(slow.items, vec![0, 1]);
    assert_eq!(summary.results[1].status, TargetStatus::Cancelled);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    assert!(!ledger.is_completed("slow"));
    assert!(!ProgressLedger::open(&path).unwrap().is_completed("slow"));
}
