//! Retry message formatting.
//!
//! Keeps the wording of retry, recovery and give-up log lines consistent
//! across every caller of [`super::retry_with_backoff`].

use super::{CrawlError, ErrorKind};
use std::time::Duration;

/// User-facing description of an error for retry messages.
pub fn describe(err: &CrawlError) -> &'static str {
    match err.kind() {
        ErrorKind::Network => {
            let message = err.to_string().to_lowercase();
            if message.contains("timeout") {
                "network timeout"
            } else if message.contains("connection") {
                "connection failed"
            } else {
                "network error"
            }
        }
        ErrorKind::RateLimit => "rate limit exceeded",
        ErrorKind::Api => match err.status() {
            Some(500) => "internal server error",
            Some(502) => "bad gateway",
            Some(503) => "service unavailable",
            Some(504) => "gateway timeout",
            Some(s) if (500..=599).contains(&s) => "server error",
            Some(401) | Some(403) => "authentication failed",
            Some(404) => "resource not found",
            Some(_) => "client error",
            None => "API business failure",
        },
        ErrorKind::Data => "malformed response",
        ErrorKind::Io => "I/O error",
        ErrorKind::Configuration => "configuration error",
        ErrorKind::Cancelled => "cancellation",
    }
}

/// Remediation hint shown when retries are exhausted.
pub fn remediation(err: &CrawlError) -> &'static str {
    match err.kind() {
        ErrorKind::Network => "Check your network connection, proxy and firewall settings",
        ErrorKind::RateLimit => "Consider reducing the request rate or waiting longer",
        ErrorKind::Api => match err.status() {
            Some(s) if (500..=599).contains(&s) => {
                "The platform may be experiencing issues, try again later"
            }
            Some(401) | Some(403) => "Verify that the session cookie is valid and not expired",
            _ => "Review the request parameters and target identifier",
        },
        ErrorKind::Data => "The endpoint returned an unexpected payload; check for API changes",
        ErrorKind::Io => "Check disk space and file permissions",
        ErrorKind::Configuration => "Fix the configuration and restart",
        ErrorKind::Cancelled => "Resume the run to continue where it stopped",
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts (retries + 1)
    pub max_attempts: u32,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Operation label (target, URL, ...)
    pub operation: String,
    /// Short error description
    pub description: &'static str,
    /// Full error text
    pub error_message: String,
    /// Remediation hint
    pub remediation: &'static str,
}

impl RetryContext {
    /// Build a context from the failing error.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        backoff_duration: Duration,
        operation: impl Into<String>,
        err: &CrawlError,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            backoff_duration,
            operation: operation.into(),
            description: describe(err),
            error_message: err.to_string(),
            remediation: remediation(err),
        }
    }

    /// Context for an attempt that succeeded after earlier failures.
    pub fn succeeded(attempt: u32, max_attempts: u32, operation: impl Into<String>) -> Self {
        Self {
            attempt,
            max_attempts,
            backoff_duration: Duration::ZERO,
            operation: operation.into(),
            description: "",
            error_message: String::new(),
            remediation: "",
        }
    }

    /// Standard retry line with attempt counters.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt + 1,
            self.max_attempts,
            self.description,
            self.backoff_duration.as_secs_f64()
        );
        append_operation(&mut message, &self.operation);
        message
    }

    /// Line emitted when an attempt after at least one failure succeeds.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded - resuming crawl",
            self.attempt, self.max_attempts
        );
        append_operation(&mut message, &self.operation);
        message
    }

    /// Final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let operation = if self.operation.is_empty() {
            "unknown"
        } else {
            &self.operation
        };
        [
            format!("[FAILED] Operation failed after {} attempts", self.max_attempts),
            format!("  Last error: {}", self.error_message),
            format!("  Operation: {operation}"),
            "  Suggestions:".to_string(),
            format!("    - {}", self.remediation),
            format!(
                "    - Try increasing the retry count (current: {})",
                self.max_attempts.saturating_sub(1)
            ),
        ]
        .join("\n")
    }
}

fn append_operation(buffer: &mut String, operation: &str) {
    if !operation.is_empty() {
        buffer.push_str(" (");
        buffer.push_str(operation);
        buffer.push(')');
    }
}
