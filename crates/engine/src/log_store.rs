//! Storage behind the run log.
//!
//! [`MemoryLogStore`] keeps entries in the process and suits single-process
//! use and tests. [`SqliteLogStore`] writes them to the `run_log_entries`
//! table, so a run fired by one process can be read from any other process
//! sharing the database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use db::models::RunLogEntryRow;
use db::repository::run_log_entries;
use db::DbPool;

use crate::error::LogError;
use crate::run_log::LogEntry;

/// Append-only storage of per-run entries.
///
/// `append` must assign `seq` values that are 0-based and gap-free within
/// a run.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, run_id: &str, text: &str) -> Result<LogEntry, LogError>;

    /// All entries with `seq >= from_seq`, in order.
    async fn tail(&self, run_id: &str, from_seq: u64) -> Result<Vec<LogEntry>, LogError>;

    async fn len(&self, run_id: &str) -> Result<u64, LogError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Each run id owns its own entry list and lock, so appends for unrelated
/// runs never contend.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    runs: RwLock<HashMap<String, Arc<Mutex<Vec<LogEntry>>>>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, run_id: &str) -> Option<Arc<Mutex<Vec<LogEntry>>>> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
    }

    fn entries(&self, run_id: &str) -> Arc<Mutex<Vec<LogEntry>>> {
        if let Some(entries) = self.existing(run_id) {
            return entries;
        }
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(run_id.to_owned())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, run_id: &str, text: &str) -> Result<LogEntry, LogError> {
        let entries = self.entries(run_id);
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = LogEntry {
            run_id: run_id.to_owned(),
            seq: entries.len() as u64,
            timestamp: Utc::now(),
            text: text.to_owned(),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn tail(&self, run_id: &str, from_seq: u64) -> Result<Vec<LogEntry>, LogError> {
        let Some(entries) = self.existing(run_id) else {
            return Ok(Vec::new());
        };
        let entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        let from = usize::try_from(from_seq).unwrap_or(usize::MAX);
        Ok(entries.iter().skip(from).cloned().collect())
    }

    async fn len(&self, run_id: &str) -> Result<u64, LogError> {
        Ok(self
            .existing(run_id)
            .map(|e| e.lock().unwrap_or_else(PoisonError::into_inner).len() as u64)
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SqliteLogStore {
    pool: DbPool,
}

impl SqliteLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl From<RunLogEntryRow> for LogEntry {
    fn from(row: RunLogEntryRow) -> Self {
        Self {
            timestamp: row.logged_at().unwrap_or_default(),
            seq: u64::try_from(row.seq).unwrap_or(0),
            run_id: row.run_id,
            text: row.text,
        }
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append(&self, run_id: &str, text: &str) -> Result<LogEntry, LogError> {
        let row = run_log_entries::append(&self.pool, run_id, text, Utc::now()).await?;
        Ok(row.into())
    }

    async fn tail(&self, run_id: &str, from_seq: u64) -> Result<Vec<LogEntry>, LogError> {
        let from = i64::try_from(from_seq).unwrap_or(i64::MAX);
        let rows = run_log_entries::tail(&self.pool, run_id, from).await?;
        Ok(rows.into_iter().map(LogEntry::from).collect())
    }

    async fn len(&self, run_id: &str) -> Result<u64, LogError> {
        let count = run_log_entries::count(&self.pool, run_id).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
