//! # Crawl Engine Library
//!
//! Building blocks for crawling paginated listing endpoints politely and
//! resumably: one process-wide request spacing, a durable ledger of finished
//! work, error classification with retry, and cursor-driven pagination with
//! a collection budget.
//!
//! ## Features
//!
//! - **Rate Limiting**: Evenly spaced requests across every task sharing a limiter
//! - **Resume Capability**: Atomic, crash-safe ledger of completed targets and items
//! - **Retry**: Exponential backoff restricted to recoverable error kinds
//! - **Pagination**: Budgeted cursor walks that keep partial results on failure
//! - **Batch Crawls**: Bounded concurrency over many targets with progress and error reports
//!
//! ## Quick Start
//!
//! ```no_run
//! use crawl_engine::fetcher::{from_fn, Page};
//! use crawl_engine::{CrawlError, PaginatedCollector, ProgressLedger, RateLimiter};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::new(3.0)?);
//!
//! // Three pages of two items each
//! let source = from_fn(|target: String, cursor: u32| async move {
//!     let items = vec![format!("{target}-{cursor}a"), format!("{target}-{cursor}b")];
//!     if cursor < 2 {
//!         Ok::<_, CrawlError>(Page::next(items, cursor + 1))
//!     } else {
//!         Ok(Page::last(items))
//!     }
//! });
//!
//! let collection = PaginatedCollector::new(source)
//!     .with_limiter(limiter)
//!     .collect("user-1", Some(5))
//!     .await;
//! assert_eq!(collection.items.len(), 5);
//!
//! let ledger = ProgressLedger::open("datas/.progress.json")?;
//! if collection.success {
//!     ledger.mark_completed("user-1")?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`crawler`] - Rate limiter, batch runner and progress counters
//! - [`ledger`] - Persistent set of completed ids
//! - [`error`] - Error taxonomy, classification, retry and reports
//! - [`fetcher`] - Page sources, HTTP transport and the paginated collector
//! - [`config`] - Environment-driven settings
//! - [`shutdown`] - Cooperative cancellation
//!
//! Components log through `tracing` and record through `metrics`; installing
//! a subscriber or exporter is left to the host (see [`logging`] and
//! [`metrics::init_metrics`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

/// CLI command implementations
pub mod cli;

/// Runtime configuration
pub mod config;

/// Crawl orchestration
pub mod crawler;

/// Error taxonomy, classification and retry
pub mod error;

/// Page sources and pagination
pub mod fetcher;

/// Persistent progress ledger
pub mod ledger;

/// Subscriber setup for hosts
pub mod logging;

/// Metrics collection
pub mod metrics;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

// Re-export commonly used types
pub use config::CrawlConfig;
pub use crawler::{BatchRunner, BatchSummary, RateLimiter};
pub use error::{CrawlError, CrawlResult, ErrorClassifier, ErrorKind, RetryPolicy};
pub use fetcher::{Page, PageSource, PaginatedCollector};
pub use ledger::{LedgerError, ProgressLedger};
pub use shutdown::{SharedShutdown, ShutdownCoordinator};
