//! Integration tests for the HTTP transport and JSON cursor source
//!
//! These tests use wiremock to serve paginated listings.

use std::sync::Arc;
use std::time::Duration;

use crawl_engine::fetcher::{
    CollectionEnd, HttpTransport, JsonCursorSource, JsonSourceConfig, PageSource,
};
use crawl_engine::{CrawlError, PaginatedCollector, RateLimiter, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> HttpTransport {
    let limiter = Arc::new(RateLimiter::new(100.0).unwrap());
    HttpTransport::new(limiter, Duration::from_secs(5), None).unwrap()
}

fn source(server: &MockServer) -> JsonCursorSource {
    let config = JsonSourceConfig::new(format!("{}/users/{{target}}/posts", server.uri()));
    JsonCursorSource::new(transport(), config).unwrap()
}

/// Mounts a three-page listing for `alice`; cursor-specific pages take
/// precedence over the first-page fallback because they are mounted first.
async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users/alice/posts"))
        .and(query_param("cursor", "c2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 5}],
            "cursor": null,
            "has_more": false,
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice/posts"))
        .and(query_param("cursor", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 3}, {"id": 4}],
            "cursor": "c2",
            "has_more": true,
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/alice/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1}, {"id": 2}],
            "cursor": "c1",
            "has_more": true,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_collects_all_pages_over_http() {
    let server = MockServer::start().await;
    mount_listing(&server).await;

    let collection = PaginatedCollector::new(source(&server))
        .collect("alice", None)
        .await;

    assert!(collection.success, "{}", collection.message);
    assert_eq!(collection.end, CollectionEnd::Exhausted);
    assert_eq!(collection.pages, 3);
    let ids: Vec<i64> = collection
        .items
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_budget_stops_before_last_page() {
    let server = MockServer::start().await;
    mount_listing(&server).await;

    let collection = PaginatedCollector::new(source(&server))
        .collect("alice", Some(3))
        .await;

    assert!(collection.success);
    assert_eq!(collection.end, CollectionEnd::BudgetReached);
    assert_eq!(collection.items.len(), 3);
    assert_eq!(collection.pages, 2);
}

#[tokio::test]
async fn test_429_is_rate_limited_and_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/bob/posts"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/bob/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1}],
            "has_more": false,
        })))
        .mount(&server)
        .await;

    let source = source(&server);
    let err = source.fetch_page("bob", &String::new()).await.unwrap_err();
    match err {
        CrawlError::RateLimited { body, .. } => assert_eq!(body.as_deref(), Some("slow down")),
        other => panic!("expected rate limit error, got {other:?}"),
    }

    // The 429 mock is used up; a retrying collector now succeeds
    let collection = PaginatedCollector::new(source)
        .with_retry(RetryPolicy::new(2, Duration::from_millis(10), 2.0))
        .collect("bob", None)
        .await;
    assert!(collection.success);
    assert_eq!(collection.items.len(), 1);
}

#[tokio::test]
async fn test_server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let collection = PaginatedCollector::new(source(&server))
        .collect("carol", None)
        .await;

    assert!(!collection.success);
    assert_eq!(collection.end, CollectionEnd::Failed);
    match collection.error {
        Some(CrawlError::Api { status, body, .. }) => {
            assert_eq!(status, Some(500));
            assert_eq!(body.as_deref(), Some("internal"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let collection = PaginatedCollector::new(source(&server))
        .collect("dave", None)
        .await;

    assert_eq!(collection.end, CollectionEnd::Malformed);
    assert!(collection.items.is_empty());
}

#[tokio::test]
async fn test_business_flag_and_extra_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/erin/posts"))
        .and(query_param("count", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 8,
            "status_msg": "login required",
        })))
        .mount(&server)
        .await;

    let mut config = JsonSourceConfig::new(format!("{}/users/{{target}}/posts", server.uri()));
    config.success_pointer = Some("/status_code".to_string());
    config.message_pointer = Some("/status_msg".to_string());
    config.extra_query = vec![("count".to_string(), "20".to_string())];
    let source = JsonCursorSource::new(transport(), config).unwrap();

    let page = source.fetch_page("erin", &String::new()).await.unwrap();
    assert!(!page.success);
    assert_eq!(page.message, "login required");
}

#[tokio::test]
async fn test_target_is_percent_encoded_into_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/a%23b%26c/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1}],
            "has_more": false,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let collection = PaginatedCollector::new(source(&server))
        .collect("a#b&c", None)
        .await;
    assert!(collection.success, "{}", collection.message);
    assert_eq!(collection.items.len(), 1);

    let collection = PaginatedCollector::new(source(&server))
        .collect("..", None)
        .await;
    assert_eq!(collection.end, CollectionEnd::Failed);
    assert!(matches!(collection.error, Some(CrawlError::Configuration(_))));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on port 1
    let config = JsonSourceConfig::new("http://127.0.0.1:1/users/{target}");
    let source = JsonCursorSource::new(transport(), config).unwrap();

    let err = source.fetch_page("frank", &String::new()).await.unwrap_err();
    assert!(matches!(err, CrawlError::Network(_)), "got {err:?}");
}
