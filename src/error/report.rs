//! Aggregate error reporting
//!
//! Envelopes collected during a run are rendered into a report for
//! diagnostics. Nothing here feeds back into control flow.

use super::classify::ErrorEnvelope;
use std::sync::{Mutex, PoisonError};

const RULE: &str = "============================================================";

/// Render envelopes as a numbered, human-readable report
pub fn build_report(envelopes: &[ErrorEnvelope]) -> String {
    if envelopes.is_empty() {
        return "No errors recorded".to_string();
    }

    let mut lines = vec![RULE.to_string(), "Error Report".to_string(), RULE.to_string()];
    lines.push(String::new());

    for (index, envelope) in envelopes.iter().enumerate() {
        lines.push(format!("Error #{}", index + 1));
        lines.push(format!(
            "  Time: {}",
            envelope.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
        lines.push(format!("  Kind: {}", envelope.error_kind));
        lines.push(format!("  URL: {}", envelope.url));
        if let Some(status) = envelope.status_code {
            lines.push(format!("  Status: {status}"));
        }
        lines.push(format!("  Message: {}", envelope.error_message));
        if !envelope.suggestion.is_empty() {
            lines.push(format!("  Suggestion: {}", envelope.suggestion));
        }
        lines.push(format!(
            "  Recoverable: {}",
            if envelope.recoverable { "yes" } else { "no" }
        ));
        lines.push(String::new());
    }

    lines.push(RULE.to_string());
    lines.push(format!("Total: {} errors", envelopes.len()));
    lines.push(RULE.to_string());
    lines.join("\n")
}

/// Thread-safe accumulator of classified failures
#[derive(Debug, Default)]
pub struct ErrorJournal {
    entries: Mutex<Vec<ErrorEnvelope>>,
}

impl ErrorJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one envelope
    pub fn record(&self, envelope: ErrorEnvelope) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
    }

    /// Number of recorded envelopes
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all envelopes in recording order
    pub fn snapshot(&self) -> Vec<ErrorEnvelope> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Report over everything recorded so far
    pub fn report(&self) -> String {
        build_report(&self.snapshot())
    }
}
