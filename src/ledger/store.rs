//! Ledger persistence
//!
//! Two locks guard a [`ProgressLedger`]: the state lock covers the in-memory
//! set and is only held for short mutations, and the I/O lock serializes
//! writes. A save takes the I/O lock first and then snapshots the latest
//! state, so a slow writer can never replace a newer file with an older
//! snapshot.

use super::record::{LedgerMetadata, LedgerStats, ProgressRecord};
use super::LedgerError;
use crate::metrics;
use chrono::Utc;
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Maximum ledger file size accepted on load (100 MiB)
pub const MAX_LEDGER_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Durable, thread-safe set of completed work-unit ids
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    state: Mutex<ProgressRecord>,
    io_lock: Mutex<()>,
}

impl ProgressLedger {
    /// Create a ledger bound to `path` without reading it
    ///
    /// # Errors
    /// [`LedgerError::InvalidPath`] if `path` is empty or an existing directory
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(LedgerError::InvalidPath("path is empty".to_string()));
        }
        if path.is_dir() {
            return Err(LedgerError::InvalidPath(format!(
                "{} is a directory",
                path.display()
            )));
        }
        Ok(Self {
            path,
            state: Mutex::new(ProgressRecord::fresh()),
            io_lock: Mutex::new(()),
        })
    }

    /// Create a ledger bound to `path` and load whatever it already holds
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let ledger = Self::new(path)?;
        ledger.load()?;
        Ok(ledger)
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory state with the file contents
    ///
    /// A missing file yields an empty ledger. A file that cannot be parsed is
    /// copied to `<file>.corrupt` and replaced in memory by an empty ledger
    /// whose metadata records the parse error; the caller is not failed.
    ///
    /// # Errors
    /// [`LedgerError::StateTooLarge`] or [`LedgerError::IoError`] if the file
    /// exists but cannot be read
    pub fn load(&self) -> Result<(), LedgerError> {
        let _io = self.lock_io();

        if !self.path.exists() {
            debug!(path = %self.path.display(), "No progress file, starting empty");
            *self.lock_state() = ProgressRecord::fresh();
            return Ok(());
        }

        let size = std::fs::metadata(&self.path)
            .map_err(|e| LedgerError::IoError(e.to_string()))?
            .len();
        if size > MAX_LEDGER_FILE_SIZE {
            return Err(LedgerError::StateTooLarge {
                size,
                max: MAX_LEDGER_FILE_SIZE,
            });
        }

        let bytes = std::fs::read(&self.path).map_err(|e| LedgerError::IoError(e.to_string()))?;
        let record = match ProgressRecord::from_json(&bytes) {
            Ok(mut record) => {
                if record.metadata.created_at.is_none() {
                    record.metadata.created_at = Some(Utc::now());
                }
                info!(
                    path = %self.path.display(),
                    completed = record.completed_ids.len(),
                    "Progress loaded"
                );
                record
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Progress file is corrupt, starting empty"
                );
                self.backup_corrupt(&bytes);
                ProgressRecord {
                    completed_ids: Default::default(),
                    metadata: LedgerMetadata {
                        error: Some(format!("corrupted progress file: {e}")),
                        ..LedgerMetadata::fresh()
                    },
                }
            }
        };

        *self.lock_state() = record;
        Ok(())
    }

    /// Write the current state to disk atomically
    ///
    /// # Errors
    /// Any I/O failure. The previous file is left untouched in that case.
    pub fn save(&self) -> Result<(), LedgerError> {
        let started = Instant::now();
        let _io = self.lock_io();

        let (json, total) = {
            let mut state = self.lock_state();
            state.metadata.last_updated = Some(Utc::now());
            state.metadata.total_completed = state.completed_ids.len();
            let json = state
                .to_json()
                .map_err(|e| LedgerError::SerializationError(e.to_string()))?;
            (json, state.completed_ids.len())
        };

        let result = write_atomic(&self.path, json.as_bytes());
        metrics::record_ledger_save(result.is_ok(), started.elapsed());
        match &result {
            Ok(()) => debug!(path = %self.path.display(), completed = total, "Progress saved"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to save progress"),
        }
        result
    }

    /// Mark one id completed and persist
    ///
    /// Returns whether the id was new. The save happens either way.
    pub fn mark_completed(&self, id: impl Into<String>) -> Result<bool, LedgerError> {
        let inserted = self.lock_state().completed_ids.insert(id.into());
        self.save()?;
        Ok(inserted)
    }

    /// Mark many ids completed, persisting only if the set grew
    ///
    /// Returns the number of ids that were not already present.
    pub fn mark_batch_completed<I, S>(&self, ids: I) -> Result<usize, LedgerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let added = {
            let mut state = self.lock_state();
            let mut added = 0;
            for id in ids {
                if state.completed_ids.insert(id.into()) {
                    added += 1;
                }
            }
            added
        };
        if added > 0 {
            self.save()?;
        }
        Ok(added)
    }

    /// Whether `id` has been marked completed
    pub fn is_completed(&self, id: &str) -> bool {
        self.lock_state().completed_ids.contains(id)
    }

    /// All completed ids, sorted
    pub fn get_completed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_state().completed_ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of completed ids
    pub fn get_completed_count(&self) -> usize {
        self.lock_state().completed_ids.len()
    }

    /// Forget one id; persists and returns `true` only if it was present
    pub fn remove_completed(&self, id: &str) -> Result<bool, LedgerError> {
        let removed = self.lock_state().completed_ids.remove(id);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Forget every id and stamp `cleared_at`
    pub fn clear_progress(&self) -> Result<(), LedgerError> {
        {
            let mut state = self.lock_state();
            let dropped = state.completed_ids.len();
            state.completed_ids.clear();
            state.metadata.cleared_at = Some(Utc::now());
            info!(path = %self.path.display(), dropped, "Progress cleared");
        }
        self.save()
    }

    /// Counters and timestamps
    pub fn get_stats(&self) -> LedgerStats {
        let state = self.lock_state();
        LedgerStats {
            total_completed: state.completed_ids.len(),
            created_at: state.metadata.created_at,
            last_updated: state.metadata.last_updated,
            cleared_at: state.metadata.cleared_at,
            progress_file: self.path.clone(),
            corruption: state.metadata.error.clone(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProgressRecord> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_io(&self) -> MutexGuard<'_, ()> {
        self.io_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn backup_corrupt(&self, bytes: &[u8]) {
        let mut backup = self.path.clone().into_os_string();
        backup.push(".corrupt");
        let backup = PathBuf::from(backup);
        match std::fs::write(&backup, bytes) {
            Ok(()) => info!(backup = %backup.display(), "Corrupt progress file backed up"),
            Err(e) => warn!(backup = %backup.display(), error = %e, "Could not back up corrupt progress file"),
        }
    }
}

/// Replace `path` with `bytes` via temp file + rename, under an advisory
/// lock on the sibling `.lock` file shared with other processes
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir).map_err(|e| LedgerError::IoError(e.to_string()))?;

    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path.with_extension("lock"))
        .map_err(|e| LedgerError::LockError(format!("Failed to create lock file: {e}")))?;
    let mut lock = RwLock::new(lock_file);
    let _guard = lock
        .write()
        .map_err(|e| LedgerError::LockError(format!("Failed to acquire write lock: {e}")))?;

    // Dropping the temp file on any error below removes it
    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| LedgerError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| LedgerError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| LedgerError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| LedgerError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| LedgerError::IoError(format!("Failed to persist temp file: {e}")))?;

    // Make the rename itself durable
    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}
