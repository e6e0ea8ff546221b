//! CLI error types and conversions

use crate::error::CrawlError;
use crate::ledger::LedgerError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Crawl error
    #[error("crawl error: {0}")]
    CrawlError(#[from] CrawlError),

    /// Ledger error
    #[error("ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    /// Output file could not be written
    #[error("output error: {0}")]
    OutputError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Some targets did not complete
    #[error("{failed} of {total} targets failed")]
    TargetsFailed {
        /// Failed or cancelled targets
        failed: usize,
        /// Targets in the batch
        total: usize,
    },
}
