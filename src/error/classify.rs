//! Failure classification
//!
//! Converts a [`CrawlError`] (plus the HTTP answer, when there was one) into a
//! uniform [`ErrorEnvelope`] carrying a recoverability verdict and an
//! operator-facing suggestion.

use super::{CrawlError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Maximum number of characters of a response body kept in an envelope
pub const RESPONSE_PREVIEW_LIMIT: usize = 500;

/// Keywords that mark an error message as likely transient
const RECOVERABLE_KEYWORDS: [&str; 6] = [
    "timeout",
    "connection",
    "temporary",
    "retry",
    "rate limit",
    "too many requests",
];

/// The part of an HTTP answer that matters for classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// HTTP status code
    pub status: u16,
    /// Response body text, if it was read
    pub body: Option<String>,
}

impl ResponseInfo {
    /// Create response info from a status and optional body
    pub fn new(status: u16, body: Option<String>) -> Self {
        Self { status, body }
    }
}

/// One classified failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// URL (or target) of the failed call
    pub url: String,
    /// Taxonomy tag
    pub error_kind: ErrorKind,
    /// Display text of the error
    pub error_message: String,
    /// When the failure was classified
    pub timestamp: DateTime<Utc>,
    /// Whether a retry is likely to succeed without operator intervention
    pub recoverable: bool,
    /// Operator-facing remediation hint (may be empty)
    pub suggestion: String,
    /// HTTP status, when the failure came from an HTTP answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Truncated response body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
}

/// Follow-up action derived from an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Remote throttled us: pause, then retry
    WaitAndRetry,
    /// Server-side failure: retry with exponential backoff
    RetryWithBackoff,
    /// Call timed out: allow more time
    IncreaseTimeout,
    /// Connection failed: check connectivity or proxy
    CheckNetwork,
    /// Generic retry
    Retry,
}

/// Stateless classifier for crawl failures
///
/// Logging goes through `tracing`; the subscriber belongs to the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Create a classifier
    pub fn new() -> Self {
        Self
    }

    /// Classify one failed call
    ///
    /// When a response is known (passed explicitly, or carried by the error
    /// itself) its status code drives the verdict. Otherwise the message is
    /// scanned for timeout/connection keywords, falling back to the error kind.
    pub fn classify(
        &self,
        err: &CrawlError,
        url: &str,
        response: Option<&ResponseInfo>,
    ) -> ErrorEnvelope {
        let carried = err.response_info();
        let response = response.or(carried.as_ref());
        let message = err.to_string();

        let mut envelope = ErrorEnvelope {
            url: url.to_string(),
            error_kind: err.kind(),
            error_message: message.clone(),
            timestamp: Utc::now(),
            recoverable: false,
            suggestion: String::new(),
            status_code: None,
            response_preview: None,
        };

        match response {
            Some(response) => {
                envelope.status_code = Some(response.status);
                let (recoverable, suggestion) = verdict_for_status(response.status);
                envelope.recoverable = recoverable;
                envelope.suggestion = suggestion.to_string();
                envelope.response_preview = response
                    .body
                    .as_deref()
                    .filter(|body| !body.is_empty())
                    .map(preview);
            }
            None => {
                let lowered = message.to_lowercase();
                let (recoverable, suggestion) = if lowered.contains("timeout") {
                    (
                        true,
                        "Request timed out; check the network connection or increase the timeout",
                    )
                } else if lowered.contains("connection") {
                    (
                        true,
                        "Connection failed; check the network connection or configure a proxy",
                    )
                } else {
                    match err.kind() {
                        ErrorKind::Network => (true, "Check network connectivity and try again"),
                        ErrorKind::RateLimit => {
                            (true, "Too many requests; reduce the request rate or retry later")
                        }
                        _ => (false, ""),
                    }
                };
                envelope.recoverable = recoverable;
                envelope.suggestion = suggestion.to_string();
            }
        }

        let mut log_line = format!("API request failed: {url}");
        if let Some(status) = envelope.status_code {
            log_line.push_str(&format!("\n  Status: {status}"));
        }
        if let Some(body) = &envelope.response_preview {
            log_line.push_str(&format!("\n  Response: {body}"));
        }
        log_line.push_str(&format!("\n  Error: {message}"));
        if !envelope.suggestion.is_empty() {
            log_line.push_str(&format!("\n  Suggestion: {}", envelope.suggestion));
        }
        error!(
            url = %url,
            kind = %envelope.error_kind,
            recoverable = envelope.recoverable,
            "{log_line}"
        );

        envelope
    }

    /// Whether retrying `err` is likely to help
    ///
    /// Network and rate-limit failures always are, as are 5xx answers.
    /// Configuration problems and cancellation never are. Anything else is
    /// judged by keywords in the message and defaults to non-recoverable.
    pub fn is_recoverable(&self, err: &CrawlError) -> bool {
        match err.kind() {
            ErrorKind::Configuration | ErrorKind::Cancelled => return false,
            ErrorKind::Network | ErrorKind::RateLimit => return true,
            _ => {}
        }

        if matches!(err.status(), Some(status) if (500..=599).contains(&status)) {
            return true;
        }

        let message = err.to_string().to_lowercase();
        RECOVERABLE_KEYWORDS
            .iter()
            .any(|keyword| message.contains(keyword))
    }

    /// Suggest what to do next for a classified failure
    pub fn suggest_recovery_action(&self, envelope: &ErrorEnvelope) -> Option<RecoveryAction> {
        if !envelope.recoverable {
            return None;
        }

        match envelope.status_code {
            Some(429) => return Some(RecoveryAction::WaitAndRetry),
            Some(status) if (500..=599).contains(&status) => {
                return Some(RecoveryAction::RetryWithBackoff)
            }
            _ => {}
        }

        let message = envelope.error_message.to_lowercase();
        if message.contains("timeout") {
            Some(RecoveryAction::IncreaseTimeout)
        } else if message.contains("connection") {
            Some(RecoveryAction::CheckNetwork)
        } else {
            Some(RecoveryAction::Retry)
        }
    }
}

fn verdict_for_status(status: u16) -> (bool, &'static str) {
    match status {
        429 => (
            true,
            "Too many requests; reduce the request rate or retry later",
        ),
        500..=599 => (true, "Server error; retry later"),
        401 => (
            false,
            "Authentication failed; check that the session cookie is still valid",
        ),
        403 => (
            false,
            "Access denied; refresh the session cookie or use a proxy",
        ),
        404 => (false, "Resource not found; check that the URL is correct"),
        _ => (false, ""),
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() <= RESPONSE_PREVIEW_LIMIT {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(RESPONSE_PREVIEW_LIMIT).collect();
    truncated.push_str("...");
    truncated
}
