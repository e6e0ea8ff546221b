//! Runtime configuration
//!
//! [`CrawlConfig`] is read from the environment once at startup. Every value
//! has a default, and CLI flags override individual fields afterwards.
//!
//! | Variable | Default |
//! |---|---|
//! | `CRAWL_RATE_LIMIT` | `3.0` requests/second |
//! | `CRAWL_RETRY_TIMES` | `3` |
//! | `CRAWL_RETRY_DELAY_MS` | `1000` |
//! | `CRAWL_BACKOFF_FACTOR` | `2.0` |
//! | `CRAWL_TIMEOUT_SECS` | `30` |
//! | `CRAWL_PROGRESS_FILE` | `datas/.progress.json` |
//! | `CRAWL_ENABLE_RESUME` | `true` |
//! | `CRAWL_CONCURRENCY` | `3` |
//! | `CRAWL_LOG_LEVEL` | `info` |
//! | `CRAWL_LOG_DIR` | unset (console only) |
//! | `LOG_FORMAT` | `text` |
//! | `HTTPS_PROXY` / `HTTP_PROXY` | unset |

use crate::crawler::config::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_PROGRESS_FILE,
    DEFAULT_RATE, DEFAULT_TIMEOUT_SECS, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_CONCURRENCY,
};
use crate::error::{CrawlError, CrawlResult, ErrorKind, RetryPolicy};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Console log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "human" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CrawlError::Configuration(format!(
                "unknown log format '{other}' (expected text or json)"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Crawl settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlConfig {
    /// Requests per second across the whole process
    pub rate: f64,
    /// Retries after the first attempt
    pub retry_times: u32,
    /// First backoff delay in milliseconds
    pub retry_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_factor: f64,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Ledger file
    pub progress_file: PathBuf,
    /// Skip targets already in the ledger
    pub enable_resume: bool,
    /// Targets crawled at once
    pub concurrency: usize,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Directory for daily-rolling log files
    pub log_dir: Option<PathBuf>,
    /// Console log format
    pub log_format: LogFormat,
    /// Proxy applied to every request
    pub proxy: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            retry_times: DEFAULT_MAX_RETRIES,
            retry_delay_ms: INITIAL_BACKOFF_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            progress_file: PathBuf::from(DEFAULT_PROGRESS_FILE),
            enable_resume: true,
            concurrency: DEFAULT_CONCURRENCY,
            log_level: "info".to_string(),
            log_dir: None,
            log_format: LogFormat::Text,
            proxy: None,
        }
    }
}

impl CrawlConfig {
    /// Load from the process environment
    pub fn from_env() -> CrawlResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through `lookup`; unset or blank variables keep their default
    ///
    /// # Errors
    /// [`CrawlError::Configuration`] if a variable does not parse or the
    /// result fails [`CrawlConfig::validate`]
    pub fn from_lookup<F>(lookup: F) -> CrawlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("CRAWL_RATE_LIMIT") {
            config.rate = parse_var("CRAWL_RATE_LIMIT", &v)?;
        }
        if let Some(v) = get("CRAWL_RETRY_TIMES") {
            config.retry_times = parse_var("CRAWL_RETRY_TIMES", &v)?;
        }
        if let Some(v) = get("CRAWL_RETRY_DELAY_MS") {
            config.retry_delay_ms = parse_var("CRAWL_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("CRAWL_BACKOFF_FACTOR") {
            config.backoff_factor = parse_var("CRAWL_BACKOFF_FACTOR", &v)?;
        }
        if let Some(v) = get("CRAWL_TIMEOUT_SECS") {
            config.timeout_secs = parse_var("CRAWL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CRAWL_PROGRESS_FILE") {
            config.progress_file = PathBuf::from(v);
        }
        if let Some(v) = get("CRAWL_ENABLE_RESUME") {
            config.enable_resume = parse_bool("CRAWL_ENABLE_RESUME", &v)?;
        }
        if let Some(v) = get("CRAWL_CONCURRENCY") {
            config.concurrency = parse_var("CRAWL_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("CRAWL_LOG_LEVEL") {
            config.log_level = v.to_lowercase();
        }
        if let Some(v) = get("CRAWL_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("LOG_FORMAT") {
            config.log_format = v.parse()?;
        }
        config.proxy = get("HTTPS_PROXY").or_else(|| get("HTTP_PROXY"));

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the crawler cannot run with
    pub fn validate(&self) -> CrawlResult<()> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(CrawlError::Configuration(format!(
                "rate must be a positive number, got {}",
                self.rate
            )));
        }
        if self.timeout_secs == 0 {
            return Err(CrawlError::Configuration(
                "timeout must be at least 1 second".to_string(),
            ));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(CrawlError::Configuration(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(CrawlError::Configuration(format!(
                "backoff factor must be positive, got {}",
                self.backoff_factor
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(CrawlError::Configuration(format!(
                "unknown log level '{}' (expected one of {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if self.progress_file.as_os_str().is_empty() {
            return Err(CrawlError::Configuration(
                "progress file path is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy for page fetches
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_times,
            Duration::from_millis(self.retry_delay_ms),
            self.backoff_factor,
        )
        .retry_on([ErrorKind::Network, ErrorKind::RateLimit])
        .with_max_delay(Duration::from_millis(MAX_BACKOFF_MS))
    }
}

fn parse_var<T>(key: &str, value: &str) -> CrawlResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| CrawlError::Configuration(format!("invalid {key}='{value}': {e}")))
}

fn parse_bool(key: &str, value: &str) -> CrawlResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CrawlError::Configuration(format!(
            "invalid {key}='{value}': expected true or false"
        ))),
    }
}
