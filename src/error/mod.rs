//! Crawl error taxonomy, classification, retry and reporting
//!
//! Every failure that crosses a component boundary is a [`CrawlError`].
//! [`classify`] turns one into an [`ErrorEnvelope`] for diagnostics,
//! [`retry`] drives bounded exponential-backoff retries, and [`report`]
//! aggregates envelopes into a human-readable report.

pub mod classify;
pub mod report;
pub mod retry;
pub mod retry_formatter;

pub use classify::{ErrorClassifier, ErrorEnvelope, RecoveryAction, ResponseInfo};
pub use report::{build_report, ErrorJournal};
pub use retry::{retry_with_backoff, RetryFilter, RetryPolicy};

use crate::crawler::rate_limit::RateLimitError;
use crate::ledger::LedgerError;
use serde::{Deserialize, Serialize};

/// Result type for crawl operations
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Failure categories, used as the `error_kind` tag of an [`ErrorEnvelope`]
/// and as the retry filter of a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid rate, invalid ledger path, bad settings
    Configuration,
    /// Timeout or connection failure
    Network,
    /// Remote side answered 429
    RateLimit,
    /// Non-2xx answer or business-failure flag
    Api,
    /// Malformed page payload
    Data,
    /// Local I/O failure
    Io,
    /// Caller requested shutdown
    Cancelled,
}

impl ErrorKind {
    /// Stable lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Api => "api",
            Self::Data => "data",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crawl errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CrawlError {
    /// Fatal setup problem, never retried
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Timeout or connection failure
    #[error("network error: {0}")]
    Network(String),

    /// Remote rate limit (HTTP 429)
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        /// Error description
        message: String,
        /// Response body, if one was read
        body: Option<String>,
    },

    /// Non-2xx response or business-failure flag
    #[error("API error{}: {message}", status_suffix(.status))]
    Api {
        /// HTTP status, absent for business-failure flags
        status: Option<u16>,
        /// Error description
        message: String,
        /// Response body, if one was read
        body: Option<String>,
    },

    /// Malformed page payload
    #[error("data error: {0}")]
    Data(String),

    /// Local I/O failure
    #[error("IO error: {0}")]
    Io(String),

    /// Ledger failure
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Shutdown was requested
    #[error("operation cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl CrawlError {
    /// Shorthand for an HTTP failure with a status code
    ///
    /// A 429 becomes [`CrawlError::RateLimited`], anything else
    /// [`CrawlError::Api`].
    pub fn http(status: u16, message: impl Into<String>, body: Option<String>) -> Self {
        if status == 429 {
            return Self::RateLimited {
                message: message.into(),
                body,
            };
        }
        Self::Api {
            status: Some(status),
            message: message.into(),
            body,
        }
    }

    /// Shorthand for a business-failure flag (no HTTP status)
    pub fn business(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// The taxonomy tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network(_) => ErrorKind::Network,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Api {
                status: Some(429), ..
            } => ErrorKind::RateLimit,
            Self::Api { .. } => ErrorKind::Api,
            Self::Data(_) => ErrorKind::Data,
            Self::Io(_) => ErrorKind::Io,
            Self::Ledger(e) if e.is_configuration() => ErrorKind::Configuration,
            Self::Ledger(_) => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Response details carried by this error, if it came from an HTTP answer
    pub fn response_info(&self) -> Option<ResponseInfo> {
        match self {
            Self::RateLimited { body, .. } => Some(ResponseInfo::new(429, body.clone())),
            Self::Api {
                status: Some(status),
                body,
                ..
            } => Some(ResponseInfo::new(*status, body.clone())),
            _ => None,
        }
    }
}

impl From<RateLimitError> for CrawlError {
    fn from(err: RateLimitError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
