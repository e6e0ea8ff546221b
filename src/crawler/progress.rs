//! Progress tracking for batch crawls.
//!
//! Counts finished targets and collected items, estimates remaining time and
//! formats the `[PROGRESS]` lines emitted by the batch runner.

use std::time::{Duration, Instant};

/// Counters for one batch run.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    /// Targets in the batch.
    pub total_targets: u64,
    /// Targets crawled successfully.
    pub completed: u64,
    /// Targets skipped because the ledger already had them.
    pub skipped: u64,
    /// Targets that failed.
    pub failed: u64,
    /// Targets left unfinished by shutdown.
    pub cancelled: u64,
    /// Items collected so far.
    pub items: u64,
    /// Items dropped because an earlier target or run already had them.
    pub duplicates: u64,
    /// When the batch started.
    pub start_time: Instant,
    /// Emit a progress line every this many finished targets.
    pub emit_every: u64,
}

impl BatchProgress {
    /// Start tracking a batch of `total_targets`.
    pub fn new(total_targets: u64, emit_every: u64) -> Self {
        Self {
            total_targets,
            completed: 0,
            skipped: 0,
            failed: 0,
            cancelled: 0,
            items: 0,
            duplicates: 0,
            start_time: Instant::now(),
            emit_every: emit_every.max(1),
        }
    }

    /// Targets that reached a final state.
    pub fn finished(&self) -> u64 {
        self.completed + self.skipped + self.failed + self.cancelled
    }

    /// Targets actually crawled (excludes skips).
    pub fn attempted(&self) -> u64 {
        self.completed + self.failed
    }

    /// Record a successful target.
    pub fn record_completed(&mut self, items: u64) {
        self.completed += 1;
        self.items = self.items.saturating_add(items);
    }

    /// Record a skipped target.
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Record a failed target; partial items still count.
    pub fn record_failed(&mut self, partial_items: u64) {
        self.failed += 1;
        self.items = self.items.saturating_add(partial_items);
    }

    /// Record a target stopped by shutdown; partial items still count.
    pub fn record_cancelled(&mut self, partial_items: u64) {
        self.cancelled += 1;
        self.items = self.items.saturating_add(partial_items);
    }

    /// Record items dropped as duplicates.
    pub fn record_duplicates(&mut self, dropped: u64) {
        self.duplicates = self.duplicates.saturating_add(dropped);
    }

    /// Whether the latest update crossed an emission boundary.
    pub fn should_emit_update(&self) -> bool {
        let finished = self.finished();
        finished > 0 && (finished % self.emit_every == 0 || finished == self.total_targets)
    }

    /// Percentage of targets finished (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_targets == 0 {
            return 100.0;
        }
        self.finished() as f64 / self.total_targets as f64 * 100.0
    }

    /// Estimate remaining time from the pace of crawled targets.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let attempted = self.attempted();
        let remaining = self.total_targets.saturating_sub(self.finished());
        if attempted == 0 || remaining == 0 {
            return None;
        }
        let per_target = self.start_time.elapsed().as_secs_f64() / attempted as f64;
        Duration::try_from_secs_f64(per_target * remaining as f64).ok()
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} targets ({:.1}%)",
            self.finished(),
            self.total_targets,
            self.percentage()
        )];
        parts.push(format!(
            "- {} completed, {} skipped, {} failed, {} items",
            self.completed, self.skipped, self.failed, self.items
        ));
        if self.duplicates > 0 {
            parts.push(format!("- {} duplicates dropped", self.duplicates));
        }
        if self.cancelled > 0 {
            parts.push(format!("- {} cancelled", self.cancelled));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }
        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
