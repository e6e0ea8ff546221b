//! Durable record of completed work units
//!
//! [`ProgressLedger`] keeps the set of finished target ids in memory and
//! mirrors it to a JSON file with atomic writes, so an interrupted batch can
//! be restarted without repeating finished work.

pub mod record;
pub mod store;

pub use record::{LedgerMetadata, LedgerStats, ProgressRecord};
pub use store::{ProgressLedger, MAX_LEDGER_FILE_SIZE};

/// Errors related to the progress ledger
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// Ledger path is empty or names a directory
    #[error("invalid ledger path: {0}")]
    InvalidPath(String),

    /// Ledger file too large to load
    #[error("ledger file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

impl LedgerError {
    /// Whether this failure comes from how the ledger was set up rather than
    /// from the filesystem at runtime
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidPath(_) | Self::StateTooLarge { .. })
    }
}
