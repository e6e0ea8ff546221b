//! CLI command implementations

pub mod crawl;
pub mod error;
pub mod ledger;

pub use crawl::CrawlArgs;
pub use error::CliError;
pub use ledger::LedgerCommand;

use crate::config::{CrawlConfig, LogFormat};
use crate::crawler::config::MAX_CONCURRENCY;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Rate-governed, resumable crawler for paginated JSON endpoints
#[derive(Parser, Debug)]
#[command(name = "crawl-engine", version, about, long_about = None)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Console log format; overrides LOG_FORMAT
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Progress ledger file; overrides CRAWL_PROGRESS_FILE
    #[arg(long = "progress-file", global = true)]
    pub progress_file: Option<PathBuf>,
}

impl Cli {
    /// Apply global flags on top of environment settings
    pub fn apply_to(&self, config: &mut CrawlConfig) {
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(path) = &self.progress_file {
            config.progress_file = path.clone();
        }
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl targets from a JSON cursor endpoint
    Crawl(CrawlArgs),

    /// Inspect or edit the progress ledger
    Ledger(LedgerCommand),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Parse and validate concurrency value (1..=MAX_CONCURRENCY)
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse a positive, finite request rate
fn parse_rate(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err("rate must be a positive number".to_string());
    }
    Ok(value)
}
