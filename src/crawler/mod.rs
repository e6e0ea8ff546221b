//! Crawl orchestration
//!
//! Request spacing, batch driving over many targets and the progress
//! counters reported while a batch runs.

pub mod batch;
pub mod config;
pub mod progress;
pub mod rate_limit;

pub use batch::{BatchRunner, BatchSummary, TargetResult, TargetStatus};
pub use progress::BatchProgress;
pub use rate_limit::{RateLimitError, RateLimiter, RateLimiterStats};
