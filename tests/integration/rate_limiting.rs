//! Integration tests for request spacing

use std::sync::Arc;
use std::time::Duration;

use crawl_engine::crawler::{RateLimitError, RateLimiter};
use tokio::time::Instant;

#[test]
fn test_rate_limiter_rejects_invalid_rates() {
    for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(RateLimiter::new(rate), Err(RateLimitError::InvalidRate(_))));
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_spaces_concurrent_tasks() {
    let limiter = Arc::new(RateLimiter::new(10.0).unwrap());
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.acquire().await;
            Instant::now()
        }));
    }

    let mut grants = Vec::new();
    for handle in handles {
        grants.push(handle.await.unwrap());
    }
    grants.sort();

    // Consecutive grants are at least one interval apart
    for pair in grants.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100));
    }
    // 10 grants at 10/s span 900ms
    assert!(grants[9] - start >= Duration::from_millis(900));

    let stats = limiter.get_stats().await;
    assert_eq!(stats.request_count, 10);
    assert_eq!(stats.throttle_count, 9);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_update_applies_to_next_acquire() {
    let limiter = RateLimiter::new(1.0).unwrap();
    limiter.acquire().await;

    limiter.update_rate(4.0).await.unwrap();
    assert_eq!(limiter.interval().await, Duration::from_millis(250));

    let before = Instant::now();
    limiter.acquire().await;
    let waited = before.elapsed();
    assert!(waited <= Duration::from_millis(260), "waited {waited:?}");

    assert!(limiter.update_rate(0.0).await.is_err());
    assert_eq!(limiter.rate().await, 4.0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_idle_gap_means_no_wait() {
    let limiter = RateLimiter::new(2.0).unwrap();
    limiter.acquire().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let before = Instant::now();
    limiter.acquire().await;
    assert_eq!(before.elapsed(), Duration::ZERO);

    let stats = limiter.get_stats().await;
    assert_eq!(stats.throttle_count, 0);
    assert_eq!(stats.throttle_rate, 0.0);
}
