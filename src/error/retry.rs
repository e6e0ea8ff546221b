//! Bounded exponential-backoff retries
//!
//! [`retry_with_backoff`] runs a caller-supplied async operation up to
//! `max_retries + 1` times. The delay starts at `initial_delay` and is
//! multiplied by `backoff_factor` after every failed attempt; this is the only
//! place in the crate where a delay grows geometrically.

use super::classify::ErrorClassifier;
use super::retry_formatter::RetryContext;
use super::{CrawlError, CrawlResult, ErrorKind};
use crate::crawler::config::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Which failures a [`RetryPolicy`] retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFilter {
    /// Retry only errors whose kind is listed
    Kinds(Vec<ErrorKind>),
    /// Retry whatever [`ErrorClassifier::is_recoverable`] accepts
    Recoverable,
}

impl RetryFilter {
    fn matches(&self, err: &CrawlError) -> bool {
        match self {
            Self::Kinds(kinds) => kinds.contains(&err.kind()),
            Self::Recoverable => ErrorClassifier::new().is_recoverable(err),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Option<Duration>,
    filter: RetryFilter,
    shutdown: Option<SharedShutdown>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(INITIAL_BACKOFF_MS),
            DEFAULT_BACKOFF_FACTOR,
        )
        .with_max_delay(Duration::from_millis(MAX_BACKOFF_MS))
    }
}

impl RetryPolicy {
    /// Create a policy retrying network and rate-limit failures
    ///
    /// # Arguments
    /// * `max_retries` - Retries after the first attempt
    /// * `initial_delay` - Sleep before the first retry
    /// * `backoff_factor` - Multiplier applied to the delay after each retry
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor,
            max_delay: None,
            filter: RetryFilter::Kinds(vec![ErrorKind::Network, ErrorKind::RateLimit]),
            shutdown: None,
        }
    }

    /// Retry exactly these kinds of failure
    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.filter = RetryFilter::Kinds(kinds.into_iter().collect());
        self
    }

    /// Retry whatever the classifier considers recoverable
    pub fn retry_recoverable(mut self) -> Self {
        self.filter = RetryFilter::Recoverable;
        self
    }

    /// Cap the delay between attempts
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Abort the wait between attempts when shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Retries after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts (`max_retries + 1`)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the first retry
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Delay multiplier
    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Active failure filter
    pub fn filter(&self) -> &RetryFilter {
        &self.filter
    }

    /// Whether `err` would be retried by this policy
    pub fn should_retry(&self, err: &CrawlError) -> bool {
        self.filter.matches(err)
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 0..retry {
            delay = self.next_delay(delay);
        }
        delay
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => grown.min(cap),
            None => grown,
        }
    }

    /// Run `op` under this policy, see [`retry_with_backoff`]
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> CrawlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CrawlResult<T>>,
    {
        retry_with_backoff(self, operation, op).await
    }
}

/// Invoke `op`, retrying matching failures with exponential backoff
///
/// Non-matching failures are returned immediately. After `max_retries`
/// retries the final failure is returned unchanged. If the policy carries a
/// shutdown handle and shutdown is requested during a backoff sleep,
/// [`CrawlError::Cancelled`] is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> CrawlResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CrawlResult<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut current_delay = policy.initial_delay;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        "{}",
                        RetryContext::succeeded(attempt, max_attempts, operation).format_success()
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !policy.should_retry(&err) {
            debug!(
                operation = %operation,
                kind = %err.kind(),
                "Error not covered by retry policy: {err}"
            );
            return Err(err);
        }

        if attempt >= max_attempts {
            let ctx = RetryContext::new(attempt, max_attempts, Duration::ZERO, operation, &err);
            error!("{}", ctx.format_failure());
            return Err(err);
        }

        let ctx = RetryContext::new(attempt, max_attempts, current_delay, operation, &err);
        warn!(
            operation = %operation,
            attempt = attempt,
            error = %err,
            "{}",
            ctx.format_retry()
        );
        metrics::record_retry_backoff(current_delay, attempt);

        match &policy.shutdown {
            Some(shutdown) => {
                if shutdown.is_shutdown_requested() || !shutdown.sleep(current_delay).await {
                    warn!(operation = %operation, "Shutdown requested, abandoning retries");
                    return Err(CrawlError::Cancelled);
                }
            }
            None => tokio::time::sleep(current_delay).await,
        }

        current_delay = policy.next_delay(current_delay);
    }
}
