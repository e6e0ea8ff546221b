//! Batch crawling over many targets
//!
//! [`BatchRunner`] crawls a list of targets with bounded concurrency. Targets
//! already recorded in the ledger are skipped, each successful target is
//! marked completed as soon as its collection finishes, and every failure is
//! classified into the run's error report.

use super::config::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, PROGRESS_EVERY_TARGETS};
use super::progress::BatchProgress;
use crate::error::{build_report, CrawlError, ErrorClassifier, ErrorEnvelope, ErrorJournal};
use crate::fetcher::{CollectionEnd, PageSource, PaginatedCollector};
use crate::ledger::{LedgerError, ProgressLedger};
use crate::metrics::TargetMetrics;
use crate::shutdown::SharedShutdown;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

type ItemIdFn<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;
type TargetUrlFn = Box<dyn Fn(&str) -> String + Send + Sync>;
type ProgressFn = Box<dyn Fn(&BatchProgress) + Send + Sync>;

/// Final state of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Collected and marked in the ledger
    Completed,
    /// Already in the ledger, not crawled
    Skipped,
    /// Collection or ledger write failed
    Failed,
    /// Not finished because shutdown was requested
    Cancelled,
}

/// Outcome of one target
#[derive(Debug, Clone)]
pub struct TargetResult<T> {
    /// Target id
    pub target: String,
    /// Final state
    pub status: TargetStatus,
    /// Items kept for this target (partial on failure)
    pub items: Vec<T>,
    /// Items dropped because the ledger already had their id
    pub duplicates: usize,
    /// Pages fetched
    pub pages: usize,
    /// Why collection stopped, if it ran
    pub end: Option<CollectionEnd>,
    /// Collection or failure message
    pub message: String,
}

impl<T> TargetResult<T> {
    fn without_collection(target: String, status: TargetStatus, message: &str) -> Self {
        Self {
            target,
            status,
            items: Vec::new(),
            duplicates: 0,
            pages: 0,
            end: None,
            message: message.to_string(),
        }
    }
}

/// Totals of a batch run
#[derive(Debug, Clone)]
pub struct BatchSummary<T> {
    /// Targets actually crawled
    pub attempted: usize,
    /// Targets completed
    pub completed: usize,
    /// Targets skipped via the ledger
    pub skipped: usize,
    /// Targets failed
    pub failed: usize,
    /// Targets left unfinished by shutdown
    pub cancelled: usize,
    /// Items across all targets
    pub item_count: usize,
    /// Items dropped as already collected
    pub duplicates: usize,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Per-target outcomes in input order
    pub results: Vec<TargetResult<T>>,
    /// Classified failures in completion order
    pub errors: Vec<ErrorEnvelope>,
}

impl<T> BatchSummary<T> {
    /// Error report over this run's failures
    pub fn report(&self) -> String {
        build_report(&self.errors)
    }

    /// Whether every target completed or was skipped
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Share of crawled targets that completed, in percent
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 100.0;
        }
        self.completed as f64 / self.attempted as f64 * 100.0
    }

    /// Crawled targets per second of wall time
    pub fn targets_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.attempted as f64 / secs
    }

    /// One-line totals
    pub fn summary_line(&self) -> String {
        format!(
            "{}/{} targets completed, {} skipped, {} failed, {} cancelled, {} items, {} duplicates dropped \
             ({:.1}% success, {:.2} targets/s over {:.1}s)",
            self.completed,
            self.attempted,
            self.skipped,
            self.failed,
            self.cancelled,
            self.item_count,
            self.duplicates,
            self.success_rate(),
            self.targets_per_second(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Crawls many targets through one [`PaginatedCollector`]
pub struct BatchRunner<S: PageSource> {
    collector: PaginatedCollector<S>,
    ledger: Option<Arc<ProgressLedger>>,
    concurrency: usize,
    budget: Option<usize>,
    item_id: Option<ItemIdFn<S::Item>>,
    target_url: Option<TargetUrlFn>,
    on_progress: Option<ProgressFn>,
    progress_every: u64,
    shutdown: Option<SharedShutdown>,
    classifier: ErrorClassifier,
    dedup_lock: Mutex<()>,
}

impl<S: PageSource> BatchRunner<S> {
    /// Runner with default concurrency and no ledger
    pub fn new(collector: PaginatedCollector<S>) -> Self {
        Self {
            collector,
            ledger: None,
            concurrency: DEFAULT_CONCURRENCY,
            budget: None,
            item_id: None,
            target_url: None,
            on_progress: None,
            progress_every: PROGRESS_EVERY_TARGETS,
            shutdown: None,
            classifier: ErrorClassifier::new(),
            dedup_lock: Mutex::new(()),
        }
    }

    /// Skip targets found in `ledger` and mark finished ones
    pub fn with_ledger(mut self, ledger: Arc<ProgressLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Crawl up to `concurrency` targets at once (clamped to 1..=32)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Per-target item budget
    pub fn with_budget(mut self, budget: Option<usize>) -> Self {
        self.budget = budget;
        self
    }

    /// Drop items whose id is already in the ledger and record new ids
    ///
    /// Only takes effect together with [`Self::with_ledger`]. Items for which
    /// `item_id` returns `None` are always kept.
    pub fn with_item_id<F>(mut self, item_id: F) -> Self
    where
        F: Fn(&S::Item) -> Option<String> + Send + Sync + 'static,
    {
        self.item_id = Some(Box::new(item_id));
        self
    }

    /// How a target is shown as the URL of its error envelopes
    pub fn with_target_url<F>(mut self, target_url: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.target_url = Some(Box::new(target_url));
        self
    }

    /// Called after every finished target
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BatchProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Log a `[PROGRESS]` line every `every` finished targets
    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    /// Stop starting new targets once shutdown is requested
    ///
    /// Give the collector the same handle to stop between pages too.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Underlying collector
    pub fn collector(&self) -> &PaginatedCollector<S> {
        &self.collector
    }

    /// Crawl `targets`; duplicates are crawled once
    pub async fn run<I, T>(&self, targets: I) -> BatchSummary<S::Item>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut seen = HashSet::new();
        let targets: Vec<String> = targets
            .into_iter()
            .map(Into::<String>::into)
            .filter(|t| seen.insert(t.clone()))
            .collect();

        info!(
            targets = targets.len(),
            concurrency = self.concurrency,
            budget = ?self.budget,
            resume = self.ledger.is_some(),
            "Starting batch crawl"
        );

        let started = Instant::now();
        let progress = Mutex::new(BatchProgress::new(targets.len() as u64, self.progress_every));
        let journal = ErrorJournal::new();

        let mut indexed: Vec<(usize, TargetResult<S::Item>)> =
            stream::iter(targets.into_iter().enumerate())
                .map(|(index, target)| {
                    let progress = &progress;
                    let journal = &journal;
                    async move {
                        let result = self.run_target(target, journal).await;
                        self.record_progress(progress, &result);
                        (index, result)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        indexed.sort_by_key(|(index, _)| *index);

        let results: Vec<TargetResult<S::Item>> = indexed.into_iter().map(|(_, r)| r).collect();
        let count = |status: TargetStatus| results.iter().filter(|r| r.status == status).count();
        let completed = count(TargetStatus::Completed);
        let failed = count(TargetStatus::Failed);
        let summary = BatchSummary {
            attempted: completed + failed,
            completed,
            skipped: count(TargetStatus::Skipped),
            failed,
            cancelled: count(TargetStatus::Cancelled),
            item_count: results.iter().map(|r| r.items.len()).sum(),
            duplicates: results.iter().map(|r| r.duplicates).sum(),
            elapsed: started.elapsed(),
            results,
            errors: journal.snapshot(),
        };

        info!("Batch crawl finished: {}", summary.summary_line());
        summary
    }

    async fn run_target(&self, target: String, journal: &ErrorJournal) -> TargetResult<S::Item> {
        if let Some(ledger) = &self.ledger {
            if ledger.is_completed(&target) {
                debug!(crawl_target = %target, "Already completed, skipping");
                return TargetResult::without_collection(target, TargetStatus::Skipped, "already completed");
            }
        }
        if self
            .shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
        {
            return TargetResult::without_collection(target, TargetStatus::Cancelled, "shutdown requested");
        }

        let metrics = TargetMetrics::start(&target);
        let collection = self.collector.collect(&target, self.budget).await;
        let mut result = TargetResult {
            target,
            status: TargetStatus::Completed,
            items: collection.items,
            duplicates: 0,
            pages: collection.pages,
            end: Some(collection.end),
            message: collection.message,
        };

        if collection.end == CollectionEnd::Cancelled {
            result.status = TargetStatus::Cancelled;
            return result;
        }

        let failure = if collection.success {
            self.commit(&mut result).err().map(CrawlError::from)
        } else {
            Some(
                collection
                    .error
                    .unwrap_or_else(|| CrawlError::business(result.message.clone())),
            )
        };

        match failure {
            None => metrics.record_success(result.items.len()),
            Some(err) => {
                metrics.record_failure(err.kind().as_str());
                let url = match &self.target_url {
                    Some(target_url) => target_url(&result.target),
                    None => result.target.clone(),
                };
                journal.record(self.classifier.classify(&err, &url, None));
                result.status = TargetStatus::Failed;
                result.message = err.to_string();
            }
        }
        result
    }

    /// Dedupe items against the ledger and mark the target completed
    ///
    /// The target and its new item ids are persisted in one save, so a failed
    /// write leaves neither on disk.
    fn commit(&self, result: &mut TargetResult<S::Item>) -> Result<(), LedgerError> {
        let Some(ledger) = &self.ledger else {
            return Ok(());
        };
        let Some(item_id) = &self.item_id else {
            ledger.mark_completed(result.target.clone())?;
            return Ok(());
        };

        let _dedup = self.dedup_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();
        let mut new_ids = Vec::new();
        let before = result.items.len();
        result.items.retain(|item| match item_id(item) {
            Some(id) if ledger.is_completed(&id) || !seen.insert(id.clone()) => false,
            Some(id) => {
                new_ids.push(id);
                true
            }
            None => true,
        });
        result.duplicates = before - result.items.len();
        if result.duplicates > 0 {
            info!(
                crawl_target = %result.target,
                duplicates = result.duplicates,
                "Dropped items already collected"
            );
        }

        new_ids.push(result.target.clone());
        ledger.mark_batch_completed(new_ids)?;
        Ok(())
    }

    fn record_progress(&self, progress: &Mutex<BatchProgress>, result: &TargetResult<S::Item>) {
        let mut progress = progress.lock().unwrap_or_else(PoisonError::into_inner);
        let items = result.items.len() as u64;
        progress.record_duplicates(result.duplicates as u64);
        match result.status {
            TargetStatus::Completed => progress.record_completed(items),
            TargetStatus::Skipped => progress.record_skipped(),
            TargetStatus::Failed => progress.record_failed(items),
            TargetStatus::Cancelled => progress.record_cancelled(items),
        }
        if progress.should_emit_update() {
            info!("{}", progress.format_progress());
        }
        if let Some(callback) = &self.on_progress {
            callback(&progress);
        }
    }
}
