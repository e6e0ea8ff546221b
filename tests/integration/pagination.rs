//! Integration tests for cursor pagination

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crawl_engine::fetcher::{from_fn, CollectionEnd, MalformedPagePolicy, Page};
use crawl_engine::{CrawlError, PaginatedCollector, RateLimiter, RetryPolicy};

/// Listing of `total` numbered items served `page_size` at a time
fn numbered_source(
    total: u32,
    page_size: u32,
) -> impl crawl_engine::PageSource<Item = u32, Cursor = u32> {
    from_fn(move |_target: String, cursor: u32| async move {
        let end = (cursor + page_size).min(total);
        let items: Vec<u32> = (cursor..end).collect();
        if end < total {
            Ok::<_, CrawlError>(Page::next(items, end))
        } else {
            Ok(Page::last(items))
        }
    })
}

#[tokio::test]
async fn test_budget_truncates_in_order() {
    let collector = PaginatedCollector::new(numbered_source(100, 4));
    let collection = collector.collect("user", Some(10)).await;

    assert!(collection.success);
    assert_eq!(collection.end, CollectionEnd::BudgetReached);
    assert_eq!(collection.items, (0..10).collect::<Vec<_>>());
    assert_eq!(collection.pages, 3);
}

#[tokio::test]
async fn test_unbounded_collects_everything() {
    let collector = PaginatedCollector::new(numbered_source(9, 4));
    let collection = collector.collect("user", None).await;

    assert!(collection.success);
    assert_eq!(collection.end, CollectionEnd::Exhausted);
    assert_eq!(collection.items.len(), 9);
    assert_eq!(collection.pages, 3);
    assert_eq!(collection.message, "collected 9 items in 3 pages");
}

#[tokio::test]
async fn test_zero_budget_fetches_nothing() {
    let calls = Arc::new(AtomicU32::new(0));
    let source = {
        let calls = Arc::clone(&calls);
        from_fn(move |_target: String, _cursor: u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CrawlError>(Page::<u32, u32>::last(vec![1])) }
        })
    };

    let collection = PaginatedCollector::new(source).collect("user", Some(0)).await;
    assert!(collection.success);
    assert!(collection.items.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failure_keeps_partial_items() {
    let source = from_fn(|_target: String, cursor: u32| async move {
        match cursor {
            0 => Ok(Page::next(vec!["a", "b"], 1)),
            _ => Err(CrawlError::http(403, "Forbidden", None)),
        }
    });

    let collection = PaginatedCollector::new(source).collect("user", None).await;
    assert!(!collection.success);
    assert_eq!(collection.end, CollectionEnd::Failed);
    assert_eq!(collection.items, vec!["a", "b"]);
    assert!(matches!(
        collection.error,
        Some(CrawlError::Api { status: Some(403), .. })
    ));
}

#[tokio::test]
async fn test_business_failure_flag() {
    let source = from_fn(|_target: String, _cursor: u32| async move {
        Ok::<_, CrawlError>(Page::<u32, u32>::failed("account is private"))
    });

    let collection = PaginatedCollector::new(source).collect("user", None).await;
    assert!(!collection.success);
    assert!(collection.message.contains("account is private"));
    assert!(collection.items.is_empty());
}

#[tokio::test]
async fn test_missing_cursor_is_distinguishable() {
    let malformed = || {
        from_fn(|_target: String, _cursor: u32| async move {
            Ok::<_, CrawlError>(Page {
                success: true,
                message: String::new(),
                items: vec![1u32, 2],
                next_cursor: None,
                has_more: true,
            })
        })
    };

    let lenient = PaginatedCollector::new(malformed()).collect("user", None).await;
    assert!(lenient.success);
    assert_eq!(lenient.end, CollectionEnd::Malformed);
    assert_eq!(lenient.items, vec![1, 2]);

    let strict = PaginatedCollector::new(malformed())
        .with_malformed_policy(MalformedPagePolicy::Incomplete)
        .collect("user", None)
        .await;
    assert!(!strict.success);
    assert_eq!(strict.end, CollectionEnd::Malformed);
    assert!(strict.message.starts_with("incomplete"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_and_limiter_together() {
    let calls = Arc::new(AtomicU32::new(0));
    let source = {
        let calls = Arc::clone(&calls);
        from_fn(move |_target: String, cursor: u32| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                // Second request fails once with a transient error
                if n == 1 {
                    return Err(CrawlError::Network("connection reset".into()));
                }
                if cursor < 2 {
                    Ok(Page::next(vec![cursor], cursor + 1))
                } else {
                    Ok(Page::last(vec![cursor]))
                }
            }
        })
    };

    let limiter = Arc::new(RateLimiter::new(2.0).unwrap());
    let start = tokio::time::Instant::now();
    let collection = PaginatedCollector::new(source)
        .with_limiter(Arc::clone(&limiter))
        .with_retry(RetryPolicy::new(2, Duration::from_millis(100), 2.0))
        .collect("user", None)
        .await;

    assert!(collection.success);
    assert_eq!(collection.items, vec![0, 1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // Four spaced requests at 2/s take at least 1.5s
    assert!(start.elapsed() >= Duration::from_millis(1500));
    assert_eq!(limiter.get_stats().await.request_count, 4);
}
