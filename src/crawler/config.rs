//! Crawl tuning constants

/// Default request rate (requests per second).
/// Three evenly spaced calls per second stays below the abuse thresholds of
/// typical listing endpoints.
pub const DEFAULT_RATE: f64 = 3.0;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Default multiplier applied to the backoff delay after each retry.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Upper bound on a single backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000; // 1 minute

/// Maximum pages fetched for a single target before pagination is abandoned.
/// Guards against endpoints that never report the last page.
pub const MAX_PAGES: usize = 10_000;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default ledger location, relative to the working directory.
pub const DEFAULT_PROGRESS_FILE: &str = "datas/.progress.json";

/// Default number of targets crawled at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Maximum number of targets crawled at once.
pub const MAX_CONCURRENCY: usize = 32;

/// Emit a `[PROGRESS]` line every N finished targets.
pub const PROGRESS_EVERY_TARGETS: u64 = 10;
