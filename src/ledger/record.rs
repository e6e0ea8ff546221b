//! In-memory and on-disk shapes of the ledger
//!
//! Files are always written as `{"completed_ids": [...], "metadata": {...}}`.
//! Older files holding a bare array of ids are still accepted on read.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

/// Ledger bookkeeping stored next to the ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    /// When this ledger was first created
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the ledger was last written
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Number of ids at the time of the last write
    #[serde(default)]
    pub total_completed: usize,
    /// Set by `clear_progress`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub cleared_at: Option<DateTime<Utc>>,
    /// Parse error of a corrupt file this ledger was recovered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Keys written by other tools, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LedgerMetadata {
    /// Metadata for a ledger created now
    pub fn fresh() -> Self {
        let now = Utc::now();
        Self {
            created_at: Some(now),
            last_updated: Some(now),
            ..Self::default()
        }
    }
}

/// Completed ids plus metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressRecord {
    /// Finished work-unit ids
    pub completed_ids: HashSet<String>,
    /// Bookkeeping
    pub metadata: LedgerMetadata,
}

impl ProgressRecord {
    /// Empty record stamped with the current time
    pub fn fresh() -> Self {
        Self {
            completed_ids: HashSet::new(),
            metadata: LedgerMetadata::fresh(),
        }
    }

    /// Parse either accepted file shape
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let record = match serde_json::from_slice::<LedgerFile>(bytes)? {
            LedgerFile::Current {
                completed_ids,
                metadata,
            } => Self {
                completed_ids: completed_ids.into_iter().collect(),
                metadata,
            },
            LedgerFile::Legacy(ids) => Self {
                completed_ids: ids.into_iter().collect(),
                metadata: LedgerMetadata::default(),
            },
        };
        Ok(record)
    }

    /// Serialize in the current object shape with ids sorted
    pub fn to_json(&self) -> serde_json::Result<String> {
        let completed_ids: BTreeSet<&str> = self.completed_ids.iter().map(String::as_str).collect();
        serde_json::to_string_pretty(&LedgerDocument {
            completed_ids,
            metadata: &self.metadata,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerFile {
    Current {
        completed_ids: Vec<String>,
        #[serde(default)]
        metadata: LedgerMetadata,
    },
    Legacy(Vec<String>),
}

#[derive(Serialize)]
struct LedgerDocument<'a> {
    completed_ids: BTreeSet<&'a str>,
    metadata: &'a LedgerMetadata,
}

/// Snapshot returned by `ProgressLedger::get_stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    /// Number of completed ids
    pub total_completed: usize,
    /// Creation time, if known
    pub created_at: Option<DateTime<Utc>>,
    /// Last write time, if known
    pub last_updated: Option<DateTime<Utc>>,
    /// Last clear time, if any
    pub cleared_at: Option<DateTime<Utc>>,
    /// Backing file
    pub progress_file: PathBuf,
    /// Corruption note carried from a recovered load
    pub corruption: Option<String>,
}

impl std::fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stamp = |t: &Option<DateTime<Utc>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        writeln!(f, "Progress file: {}", self.progress_file.display())?;
        writeln!(f, "Completed: {}", self.total_completed)?;
        writeln!(f, "Created: {}", stamp(&self.created_at))?;
        write!(f, "Last updated: {}", stamp(&self.last_updated))?;
        if self.cleared_at.is_some() {
            write!(f, "\nCleared: {}", stamp(&self.cleared_at))?;
        }
        if let Some(note) = &self.corruption {
            write!(f, "\nRecovered from corrupt file: {note}")?;
        }
        Ok(())
    }
}

/// Accepts RFC 3339 and zone-less ISO 8601 (read as UTC); anything else is
/// dropped rather than failing the whole load
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
