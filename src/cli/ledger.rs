//! CLI command for inspecting and editing the progress ledger

use super::{CliError, OutputFormat};
use crate::ledger::ProgressLedger;
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Ledger subcommand
#[derive(Debug, Args)]
pub struct LedgerCommand {
    #[command(subcommand)]
    action: LedgerAction,
}

/// Ledger actions
#[derive(Debug, Subcommand)]
enum LedgerAction {
    /// Show counts and timestamps
    Stats,

    /// List completed ids in sorted order
    List {
        /// Show at most this many ids
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check whether an id is completed (exit code 1 if not)
    Check {
        /// Id to look up
        id: String,
    },

    /// Forget a completed id so it is crawled again
    Remove {
        /// Id to remove
        id: String,
    },

    /// Forget every completed id
    Clear,

    /// Record ids as completed
    Mark {
        /// Ids to add
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

impl LedgerCommand {
    /// Execute against the ledger at `path`
    ///
    /// Returns `false` when a `check` finds the id missing.
    pub fn execute(&self, path: &Path, format: OutputFormat) -> Result<bool, CliError> {
        let ledger = ProgressLedger::open(path)?;

        match &self.action {
            LedgerAction::Stats => {
                let stats = ledger.get_stats();
                match format {
                    OutputFormat::Json => print_json(&stats)?,
                    OutputFormat::Human => println!("{stats}"),
                }
            }
            LedgerAction::List { limit } => {
                let ids = ledger.get_completed_ids();
                let total = ids.len();
                let shown: Vec<String> = ids.into_iter().take(limit.unwrap_or(usize::MAX)).collect();
                match format {
                    OutputFormat::Json => print_json(&json!({
                        "total": total,
                        "ids": shown,
                    }))?,
                    OutputFormat::Human => {
                        for id in &shown {
                            println!("{id}");
                        }
                        if shown.len() < total {
                            println!("... {} more", total - shown.len());
                        }
                    }
                }
            }
            LedgerAction::Check { id } => {
                let completed = ledger.is_completed(id);
                match format {
                    OutputFormat::Json => print_json(&json!({
                        "id": id,
                        "completed": completed,
                    }))?,
                    OutputFormat::Human if completed => println!("{id}: completed"),
                    OutputFormat::Human => println!("{id}: not completed"),
                }
                return Ok(completed);
            }
            LedgerAction::Remove { id } => {
                let removed = ledger.remove_completed(id)?;
                report_change(format, "removed", usize::from(removed), &ledger)?;
            }
            LedgerAction::Clear => {
                let before = ledger.get_completed_count();
                ledger.clear_progress()?;
                report_change(format, "cleared", before, &ledger)?;
            }
            LedgerAction::Mark { ids } => {
                let added = ledger.mark_batch_completed(ids.iter().cloned())?;
                report_change(format, "added", added, &ledger)?;
            }
        }

        Ok(true)
    }
}

fn report_change(
    format: OutputFormat,
    action: &str,
    changed: usize,
    ledger: &ProgressLedger,
) -> Result<(), CliError> {
    let total = ledger.get_completed_count();
    match format {
        OutputFormat::Json => print_json(&json!({
            "action": action,
            "changed": changed,
            "total_completed": total,
        })),
        OutputFormat::Human => {
            println!("{action} {changed} id(s); {total} completed");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::OutputError(format!("failed to serialize output: {e}")))?;
    println!("{text}");
    Ok(())
}
