//! `crawl` command: batch crawl of a JSON cursor endpoint

use super::{parse_concurrency, parse_rate, CliError, OutputFormat};
use crate::config::CrawlConfig;
use crate::crawler::{BatchProgress, BatchRunner, BatchSummary, RateLimiter};
use crate::error::CrawlError;
use crate::fetcher::{
    HttpTransport, JsonCursorSource, JsonSourceConfig, MalformedPagePolicy, PaginatedCollector,
};
use crate::ledger::ProgressLedger;
use crate::shutdown::SharedShutdown;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Crawl command arguments
#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Endpoint URL with a `{target}` placeholder
    #[arg(long)]
    pub url_template: String,

    /// Targets to crawl
    pub targets: Vec<String>,

    /// File with one target per line (`#` starts a comment)
    #[arg(long)]
    pub targets_file: Option<PathBuf>,

    /// Stop each target after this many items
    #[arg(long)]
    pub budget: Option<usize>,

    /// Write collected items as JSON to this file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Targets crawled at once (max: 32); overrides CRAWL_CONCURRENCY
    #[arg(long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Requests per second; overrides CRAWL_RATE_LIMIT
    #[arg(long, value_parser = parse_rate)]
    pub rate: Option<f64>,

    /// Crawl targets even if the ledger has them
    #[arg(long, default_value_t = false)]
    pub no_resume: bool,

    /// Query parameter carrying the cursor
    #[arg(long, default_value = "cursor")]
    pub cursor_param: String,

    /// JSON pointer to the item array
    #[arg(long, default_value = "/items")]
    pub items_pointer: String,

    /// JSON pointer to the next cursor
    #[arg(long, default_value = "/cursor")]
    pub cursor_pointer: String,

    /// JSON pointer to the has-more flag (empty: infer from the cursor)
    #[arg(long, default_value = "/has_more")]
    pub has_more_pointer: String,

    /// JSON pointer to a success flag
    #[arg(long)]
    pub success_pointer: Option<String>,

    /// JSON pointer to the endpoint message
    #[arg(long)]
    pub message_pointer: Option<String>,

    /// JSON pointer to an item id; seen ids are dropped across runs
    #[arg(long)]
    pub item_id_pointer: Option<String>,

    /// Treat a page without a continuation cursor as a failed target
    #[arg(long, default_value_t = false)]
    pub strict_pages: bool,

    /// Extra query parameter sent with every request (KEY=VALUE)
    #[arg(long = "query", value_parser = parse_query_pair)]
    pub extra_query: Vec<(String, String)>,
}

impl CrawlArgs {
    /// Run the crawl
    ///
    /// # Errors
    /// Setup failures, an unwritable output file, or
    /// [`CliError::TargetsFailed`] when any target failed or was cancelled
    pub async fn execute(
        &self,
        config: &CrawlConfig,
        format: OutputFormat,
        shutdown: SharedShutdown,
    ) -> Result<(), CliError> {
        let config = self.effective_config(config)?;
        let targets = self.load_targets()?;
        if targets.is_empty() {
            return Err(CliError::InvalidArgument(
                "no targets given; pass them as arguments or with --targets-file".to_string(),
            ));
        }

        let limiter = Arc::new(RateLimiter::new(config.rate).map_err(CrawlError::from)?);
        let transport = HttpTransport::from_config(&config, limiter)?;
        let source = JsonCursorSource::new(transport, self.source_config())?;

        let malformed_policy = if self.strict_pages {
            MalformedPagePolicy::Incomplete
        } else {
            MalformedPagePolicy::Terminate
        };
        let collector = PaginatedCollector::new(source)
            .with_retry(config.retry_policy().with_shutdown(shutdown.clone()))
            .with_shutdown(shutdown.clone())
            .with_malformed_policy(malformed_policy);

        let pb = create_progress_bar(targets.len() as u64, format);
        let url_config = self.source_config();
        let mut runner = BatchRunner::new(collector)
            .with_concurrency(config.concurrency)
            .with_budget(self.budget)
            .with_shutdown(shutdown)
            .with_target_url(move |target| {
                url_config
                    .url_for(target)
                    .unwrap_or_else(|_| target.to_string())
            })
            .with_progress_callback({
                let pb = pb.clone();
                move |progress: &BatchProgress| {
                    pb.set_position(progress.finished());
                    pb.set_message(format!("{} items, {} failed", progress.items, progress.failed));
                }
            });

        if config.enable_resume {
            let ledger = Arc::new(ProgressLedger::open(&config.progress_file)?);
            info!(
                progress_file = %config.progress_file.display(),
                completed = ledger.get_completed_count(),
                "Resuming from ledger"
            );
            runner = runner.with_ledger(ledger);
            if let Some(pointer) = self.item_id_pointer.clone() {
                runner = runner.with_item_id(move |item: &Value| item_id(item, &pointer));
            }
        } else if self.item_id_pointer.is_some() {
            warn!("--item-id-pointer has no effect with resume disabled");
        }

        let summary = runner.run(targets).await;
        pb.finish_and_clear();

        if let Some(path) = &self.output {
            write_output(path, &summary)?;
            info!(output = %path.display(), items = summary.item_count, "Wrote collected items");
        }
        print_summary(&summary, format)?;

        if summary.is_success() {
            Ok(())
        } else {
            Err(CliError::TargetsFailed {
                failed: summary.failed + summary.cancelled,
                total: summary.results.len(),
            })
        }
    }

    fn effective_config(&self, base: &CrawlConfig) -> Result<CrawlConfig, CliError> {
        let mut config = base.clone();
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.no_resume {
            config.enable_resume = false;
        }
        config.validate()?;
        Ok(config)
    }

    fn source_config(&self) -> JsonSourceConfig {
        let mut source = JsonSourceConfig::new(self.url_template.clone());
        source.cursor_param = self.cursor_param.clone();
        source.items_pointer = self.items_pointer.clone();
        source.cursor_pointer = self.cursor_pointer.clone();
        source.has_more_pointer = Some(self.has_more_pointer.clone()).filter(|p| !p.is_empty());
        source.success_pointer = self.success_pointer.clone();
        source.message_pointer = self.message_pointer.clone();
        source.extra_query = self.extra_query.clone();
        source
    }

    fn load_targets(&self) -> Result<Vec<String>, CliError> {
        let mut targets = self.targets.clone();
        if let Some(path) = &self.targets_file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                CliError::InvalidArgument(format!(
                    "cannot read targets file {}: {e}",
                    path.display()
                ))
            })?;
            targets.extend(parse_targets(&content));
        }
        Ok(targets)
    }
}

fn parse_targets(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

fn parse_query_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("'{s}' is not KEY=VALUE")),
    }
}

fn item_id(item: &Value, pointer: &str) -> Option<String> {
    match item.pointer(pointer)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Create progress bar with style
fn create_progress_bar(total: u64, format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} targets ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn summary_json(summary: &BatchSummary<Value>) -> Value {
    json!({
        "attempted": summary.attempted,
        "completed": summary.completed,
        "skipped": summary.skipped,
        "failed": summary.failed,
        "cancelled": summary.cancelled,
        "item_count": summary.item_count,
        "duplicates": summary.duplicates,
        "success_rate": summary.success_rate(),
        "elapsed_secs": summary.elapsed.as_secs_f64(),
        "errors": summary.errors,
    })
}

fn write_output(path: &Path, summary: &BatchSummary<Value>) -> Result<(), CliError> {
    let targets: Vec<Value> = summary
        .results
        .iter()
        .map(|r| {
            json!({
                "target": r.target,
                "status": r.status,
                "end": r.end,
                "pages": r.pages,
                "duplicates": r.duplicates,
                "message": r.message,
                "items": r.items,
            })
        })
        .collect();
    let document = json!({
        "summary": summary_json(summary),
        "targets": targets,
    });

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| CliError::OutputError(format!("{}: {e}", parent.display())))?;
    }
    let text = serde_json::to_string_pretty(&document)
        .map_err(|e| CliError::OutputError(format!("failed to serialize output: {e}")))?;
    std::fs::write(path, text)
        .map_err(|e| CliError::OutputError(format!("{}: {e}", path.display())))
}

fn print_summary(summary: &BatchSummary<Value>, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(&summary_json(summary))
                .map_err(|e| CliError::OutputError(format!("failed to serialize output: {e}")))?;
            println!("{text}");
        }
        OutputFormat::Human => {
            println!("{}", summary.summary_line());
            if !summary.errors.is_empty() {
                eprintln!("{}", summary.report());
            }
        }
    }
    Ok(())
}
