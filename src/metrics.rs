//! Crawl observability metrics
//!
//! Counters and histograms for request spacing, retries, pagination, ledger
//! writes and per-target outcomes.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate macros; recording is a no-op until a recorder is
//!   installed
//! - [`init_metrics`] installs the Prometheus exporter with a scrape endpoint
//! - The host decides whether to call it; library code only records

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls return `Ok(())` without rebinding.
///
/// # Arguments
/// * `addr` - Socket address to bind the Prometheus scrape endpoint
///
/// # Returns
/// Ok(()) if metrics initialized successfully, Err if binding fails
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "crawl_requests_total",
        Unit::Count,
        "HTTP requests sent, labelled by outcome"
    );
    describe_histogram!(
        "crawl_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "rate_limit_granted_total",
        Unit::Count,
        "Calls granted by the rate limiter"
    );
    describe_counter!(
        "rate_limit_throttled_total",
        Unit::Count,
        "Calls that had to wait for the rate limiter"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for the rate limiter"
    );
    describe_counter!("crawl_retries_total", Unit::Count, "Retry attempts");
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!("crawl_pages_total", Unit::Count, "Pages fetched");
    describe_counter!("crawl_items_total", Unit::Count, "Items collected");
    describe_counter!(
        "ledger_saves_total",
        Unit::Count,
        "Ledger writes, labelled by outcome"
    );
    describe_histogram!(
        "ledger_save_duration_seconds",
        Unit::Seconds,
        "Ledger write duration in seconds"
    );
    describe_counter!(
        "targets_completed_total",
        Unit::Count,
        "Targets crawled successfully"
    );
    describe_counter!("targets_failed_total", Unit::Count, "Targets that failed");

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Whether [`init_metrics`] has completed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP request
#[derive(Debug)]
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            "Starting HTTP request"
        );
        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record a response with a status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();
        counter!(
            "crawl_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!(
            "crawl_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }
        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();
        counter!(
            "crawl_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
        )
        .increment(1);
        histogram!(
            "crawl_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());
        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a call granted by the rate limiter
pub fn record_request_granted() {
    counter!("rate_limit_granted_total").increment(1);
}

/// Record a rate limiter wait
pub fn record_throttle(wait: Duration) {
    counter!("rate_limit_throttled_total").increment(1);
    histogram!("rate_limit_wait_seconds").record(wait.as_secs_f64());
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "crawl_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);
    histogram!(
        "retry_backoff_duration_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());
    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Record one fetched page
pub fn record_page(items: usize) {
    counter!("crawl_pages_total").increment(1);
    counter!("crawl_items_total").increment(items as u64);
}

/// Record a ledger write
pub fn record_ledger_save(success: bool, duration: Duration) {
    let outcome = if success { "ok" } else { "error" };
    counter!("ledger_saves_total", "outcome" => outcome).increment(1);
    histogram!("ledger_save_duration_seconds").record(duration.as_secs_f64());
}

/// Outcome tracking for one crawl target
#[derive(Debug)]
pub struct TargetMetrics {
    target: String,
    start_time: Instant,
}

impl TargetMetrics {
    /// Start tracking a target
    pub fn start(target: impl Into<String>) -> Self {
        let target = target.into();
        debug!(crawl_target = %target, "Target crawl started");
        Self {
            target,
            start_time: Instant::now(),
        }
    }

    /// Record a successful crawl
    pub fn record_success(&self, items_count: usize) {
        counter!("targets_completed_total").increment(1);
        info!(
            crawl_target = %self.target,
            items_count,
            duration_ms = self.start_time.elapsed().as_millis(),
            "Target completed"
        );
    }

    /// Record a failed crawl
    pub fn record_failure(&self, kind: &str) {
        counter!("targets_failed_total", "kind" => kind.to_string()).increment(1);
        warn!(
            crawl_target = %self.target,
            kind,
            duration_ms = self.start_time.elapsed().as_millis(),
            "Target failed"
        );
    }
}
