//! End-to-end tests for the crawl-engine binary

use assert_cmd::Command;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crawl_engine(progress_file: &Path) -> Command {
    let mut cmd = Command::cargo_bin("crawl-engine").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("HTTP_PROXY")
        .env_remove("HTTPS_PROXY")
        .env_remove("http_proxy")
        .env_remove("https_proxy")
        .env("CRAWL_PROGRESS_FILE", progress_file)
        .env("CRAWL_LOG_LEVEL", "warn");
    cmd
}

#[test]
fn test_ledger_mark_check_remove() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("progress.json");

    crawl_engine(&file)
        .args(["ledger", "mark", "user-1", "user-2"])
        .assert()
        .success();

    crawl_engine(&file)
        .args(["ledger", "check", "user-1"])
        .assert()
        .success();
    crawl_engine(&file)
        .args(["ledger", "check", "user-9"])
        .assert()
        .code(1);

    crawl_engine(&file)
        .args(["ledger", "remove", "user-1"])
        .assert()
        .success();
    crawl_engine(&file)
        .args(["ledger", "check", "user-1"])
        .assert()
        .code(1);
}

#[test]
fn test_ledger_stats_json() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("progress.json");

    crawl_engine(&file)
        .args(["ledger", "mark", "a", "b", "c"])
        .assert()
        .success();

    let output = crawl_engine(&file)
        .args(["--output-format", "json", "ledger", "stats"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["total_completed"], 3);
}

#[test]
fn test_progress_file_flag_overrides_env() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("env.json");
    let flag_file = dir.path().join("flag.json");

    crawl_engine(&env_file)
        .args(["ledger", "--progress-file"])
        .arg(&flag_file)
        .args(["mark", "x"])
        .assert()
        .success();

    assert!(flag_file.exists());
    assert!(!env_file.exists());
}

#[test]
fn test_invalid_environment_is_rejected() {
    let dir = TempDir::new().unwrap();
    crawl_engine(&dir.path().join("p.json"))
        .env("CRAWL_RATE_LIMIT", "0")
        .args(["ledger", "stats"])
        .assert()
        .code(2);
}

#[test]
fn test_crawl_requires_targets() {
    let dir = TempDir::new().unwrap();
    crawl_engine(&dir.path().join("p.json"))
        .args(["crawl", "--url-template", "http://127.0.0.1:1/{target}"])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crawl_writes_output_and_ledger() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1}, {"id": 2}],
            "has_more": false,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/bob"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let progress = dir.path().join("progress.json");
    let output_file = dir.path().join("out").join("items.json");
    let template = format!("{}/users/{{target}}", server.uri());

    let status = {
        let progress = progress.clone();
        let output_file = output_file.clone();
        tokio::task::spawn_blocking(move || {
            crawl_engine(&progress)
                .args(["--output-format", "json", "crawl", "--url-template"])
                .arg(&template)
                .arg("--output")
                .arg(&output_file)
                .args(["--rate", "50", "alice", "bob"])
                .output()
                .unwrap()
                .status
        })
        .await
        .unwrap()
    };
    // bob fails, so the run reports failure
    assert_eq!(status.code(), Some(1));

    let document: Value =
        serde_json::from_str(&std::fs::read_to_string(&output_file).unwrap()).unwrap();
    assert_eq!(document["summary"]["completed"], 1);
    assert_eq!(document["summary"]["failed"], 1);
    assert_eq!(document["targets"][0]["target"], "alice");
    assert_eq!(document["targets"][0]["status"], "completed");
    assert_eq!(document["targets"][0]["items"].as_array().unwrap().len(), 2);
    assert_eq!(document["targets"][1]["status"], "failed");

    let ledger: Value = serde_json::from_str(&std::fs::read_to_string(&progress).unwrap()).unwrap();
    assert_eq!(ledger["completed_ids"], json!(["alice"]));
}
