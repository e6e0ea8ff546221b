//! Strict request spacing
//!
//! Every caller sharing a [`RateLimiter`] is serialized: no two `acquire()`
//! completions are closer than `1 / rate` seconds. There is no burst
//! allowance; evenly spaced traffic is what keeps remote abuse detection quiet.

use crate::metrics;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Shared limiter state, guarded by a single mutex
#[derive(Debug)]
struct RateState {
    rate: f64,
    interval: Duration,
    last_request: Option<Instant>,
    request_count: u64,
    throttle_count: u64,
}

impl RateState {
    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        self.interval = Duration::from_secs_f64(1.0 / rate);
    }
}

/// Limiter counters snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    /// Configured rate (requests per second)
    pub rate: f64,
    /// Granted acquisitions
    pub request_count: u64,
    /// Acquisitions that had to wait
    pub throttle_count: u64,
    /// `throttle_count / request_count` as a percentage
    pub throttle_rate: f64,
}

impl std::fmt::Display for RateLimiterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rate={:.2}/s requests={} throttled={} ({:.2}%)",
            self.rate, self.request_count, self.throttle_count, self.throttle_rate
        )
    }
}

/// Global request spacer shared through `Arc` by every caller on one quota
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateState>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` requests per second
    ///
    /// # Errors
    /// Returns [`RateLimitError::InvalidRate`] unless `rate` is finite and > 0
    pub fn new(rate: f64) -> Result<Self, RateLimitError> {
        validate_rate(rate)?;
        let mut state = RateState {
            rate,
            interval: Duration::ZERO,
            last_request: None,
            request_count: 0,
            throttle_count: 0,
        };
        state.set_rate(rate);
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Wait until at least one interval has passed since the previous grant
    ///
    /// The lock is held across the wait, so concurrent callers are granted
    /// one at a time in arrival order.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < state.interval {
                let wait = state.interval - elapsed;
                state.throttle_count += 1;
                debug!(wait_ms = wait.as_millis(), "Throttling request");
                sleep(wait).await;
                metrics::record_throttle(wait);
            }
        }

        state.last_request = Some(Instant::now());
        state.request_count += 1;
        metrics::record_request_granted();
    }

    /// Change the rate; takes effect for the next `acquire()`
    ///
    /// # Errors
    /// Returns [`RateLimitError::InvalidRate`] and keeps the previous rate
    /// unless `rate` is finite and > 0
    pub async fn update_rate(&self, rate: f64) -> Result<(), RateLimitError> {
        validate_rate(rate)?;
        let mut state = self.state.lock().await;
        let previous = state.rate;
        state.set_rate(rate);
        info!(previous, rate, "Rate limit updated");
        Ok(())
    }

    /// Current rate (requests per second)
    pub async fn rate(&self) -> f64 {
        self.state.lock().await.rate
    }

    /// Minimum spacing between grants
    pub async fn interval(&self) -> Duration {
        self.state.lock().await.interval
    }

    /// Snapshot of the counters
    pub async fn get_stats(&self) -> RateLimiterStats {
        let state = self.state.lock().await;
        let throttle_rate = if state.request_count > 0 {
            state.throttle_count as f64 / state.request_count as f64 * 100.0
        } else {
            0.0
        };
        RateLimiterStats {
            rate: state.rate,
            request_count: state.request_count,
            throttle_count: state.throttle_count,
            throttle_rate,
        }
    }

    /// Zero the counters (rate and spacing are unaffected)
    pub async fn reset_stats(&self) {
        let mut state = self.state.lock().await;
        state.request_count = 0;
        state.throttle_count = 0;
    }
}

fn validate_rate(rate: f64) -> Result<(), RateLimitError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(RateLimitError::InvalidRate(rate))
    }
}

/// Rate limiter errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    /// Rate must be a positive, finite number
    #[error("rate must be greater than 0, got {0}")]
    InvalidRate(f64),
}
