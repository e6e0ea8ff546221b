//! Integration tests for resumable batch crawls over HTTP

use std::sync::Arc;
use std::time::Duration;

use crawl_engine::crawler::TargetStatus;
use crawl_engine::fetcher::{HttpTransport, JsonCursorSource, JsonSourceConfig};
use crawl_engine::{BatchRunner, PaginatedCollector, ProgressLedger, RateLimiter, RetryPolicy};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn runner(server: &MockServer, ledger: Arc<ProgressLedger>) -> BatchRunner<JsonCursorSource> {
    let limiter = Arc::new(RateLimiter::new(200.0).unwrap());
    let transport = HttpTransport::new(limiter, Duration::from_secs(5), None).unwrap();
    let config = JsonSourceConfig::new(format!("{}/users/{{target}}", server.uri()));
    let source = JsonCursorSource::new(transport, config).unwrap();
    let collector = PaginatedCollector::new(source)
        .with_retry(RetryPolicy::new(1, Duration::from_millis(10), 2.0));

    BatchRunner::new(collector)
        .with_concurrency(2)
        .with_ledger(ledger)
        .with_item_id(|item: &Value| item["id"].as_str().map(str::to_string))
}

async fn mount_user(server: &MockServer, user: &str, ids: &[&str]) {
    let items: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    Mock::given(method("GET"))
        .and(path(format!("/users/{user}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": items,
            "has_more": false,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rerun_only_crawls_unfinished_targets() {
    let dir = TempDir::new().unwrap();
    let ledger_path = dir.path().join(".progress.json");
    let server = MockServer::start().await;

    mount_user(&server, "alice", &["p1", "p2"]).await;
    mount_user(&server, "bob", &["p3"]).await;
    // carol is down during the first run
    Mock::given(method("GET"))
        .and(path("/users/carol"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let first = {
        let ledger = Arc::new(ProgressLedger::open(&ledger_path).unwrap());
        runner(&server, ledger).run(["alice", "bob", "carol"]).await
    };
    assert_eq!(first.completed, 2);
    assert_eq!(first.failed, 1);
    assert_eq!(first.results[2].status, TargetStatus::Failed);
    assert_eq!(first.errors[0].status_code, Some(503));
    assert!(first.errors[0].recoverable);

    // carol recovers; a fresh process resumes from the ledger file
    mount_user(&server, "carol", &["p4", "p1"]).await;
    let ledger = Arc::new(ProgressLedger::open(&ledger_path).unwrap());
    let second = runner(&server, Arc::clone(&ledger))
        .run(["alice", "bob", "carol"])
        .await;

    assert!(second.is_success(), "{}", second.report());
    assert_eq!(second.skipped, 2);
    assert_eq!(second.completed, 1);
    // p1 was already collected from alice in the first run
    let carol = &second.results[2];
    assert_eq!(carol.status, TargetStatus::Completed);
    assert_eq!(carol.items, vec![json!({"id": "p4"})]);
    assert_eq!(carol.duplicates, 1);
    assert_eq!(second.duplicates, 1);

    for id in ["alice", "bob", "carol", "p1", "p2", "p3", "p4"] {
        assert!(ledger.is_completed(id), "{id} missing from ledger");
    }
}

#[tokio::test]
async fn test_budget_applies_per_target() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_user(&server, "dave", &["a", "b", "c"]).await;
    mount_user(&server, "erin", &["d", "e", "f"]).await;

    let ledger = Arc::new(ProgressLedger::open(dir.path().join("p.json")).unwrap());
    let summary = runner(&server, ledger)
        .with_budget(Some(2))
        .run(["dave", "erin"])
        .await;

    assert!(summary.is_success());
    assert_eq!(summary.item_count, 4);
    assert!(summary.results.iter().all(|r| r.items.len() == 2));
}
