//! Tracing subscriber setup for the binary
//!
//! Library code only emits `tracing` events. The host decides where they go:
//! console output on stderr (text or JSON) filtered by `RUST_LOG` or the configured
//! level, plus an optional daily-rolling log file written off-thread.

use crate::config::LogFormat;
use crate::error::{CrawlError, CrawlResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of rolled log files
pub const LOG_FILE_PREFIX: &str = "crawl-engine.log";

/// Filter used when `RUST_LOG` is unset
pub fn default_directive(level: &str) -> String {
    format!("crawl_engine={level}")
}

/// Install the global subscriber
///
/// Returns the file writer's guard when `log_dir` is set; keep it alive until
/// exit so buffered lines are flushed.
///
/// # Errors
/// [`CrawlError::Io`] if the log directory cannot be created,
/// [`CrawlError::Configuration`] if a subscriber is already installed
pub fn init(
    level: &str,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> CrawlResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                CrawlError::Io(format!("failed to create log directory {}: {e}", dir.display()))
            })?;
            let (writer, guard) = non_blocking(rolling::daily(dir, LOG_FILE_PREFIX));
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (json_console, text_console) = match format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_console)
        .with(text_console)
        .with(file_layer)
        .try_init()
        .map_err(|e| CrawlError::Configuration(format!("failed to install logger: {e}")))?;

    Ok(guard)
}
