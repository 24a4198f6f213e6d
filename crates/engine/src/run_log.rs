//! Append-only per-run log with live followers.
//!
//! Entries live in a [`LogStore`]. Followers in the appending process are
//! woken through a per-run `watch` channel; followers of runs appended
//! elsewhere (or before the channel existed) re-read on a fixed interval.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::error::LogError;
use crate::log_store::{LogStore, MemoryLogStore};

/// One line of a run's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub run_id: String,
    /// 0-based, gap-free within a run.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Tuning knobs for followers.
#[derive(Debug, Clone)]
pub struct RunLogConfig {
    /// Upper bound on how long a follower waits before re-reading.
    pub poll_interval: Duration,
}

impl Default for RunLogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Log shared by every run in the process.
pub struct RunLog {
    store: Arc<dyn LogStore>,
    /// Carries the number of entries appended so far, per run. Created on
    /// the first append in this process.
    wakers: RwLock<HashMap<String, watch::Sender<u64>>>,
    config: RunLogConfig,
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::in_memory(RunLogConfig::default())
    }
}

impl RunLog {
    pub fn new(store: Arc<dyn LogStore>, config: RunLogConfig) -> Self {
        Self {
            store,
            wakers: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn in_memory(config: RunLogConfig) -> Self {
        Self::new(Arc::new(MemoryLogStore::new()), config)
    }

    fn subscribe(&self, run_id: &str) -> Option<watch::Receiver<u64>> {
        self.wakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .map(watch::Sender::subscribe)
    }

    fn wake(&self, run_id: &str, appended: u64) {
        {
            let wakers = self.wakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = wakers.get(run_id) {
                sender.send_replace(appended);
                return;
            }
        }
        self.wakers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(run_id.to_owned())
            .or_insert_with(|| watch::channel(0).0)
            .send_replace(appended);
    }

    /// Append `text` to the run's log and wake its followers.
    pub async fn append(&self, run_id: &str, text: impl Into<String>) -> Result<LogEntry, LogError> {
        let entry = self.store.append(run_id, &text.into()).await?;
        self.wake(run_id, entry.seq + 1);
        Ok(entry)
    }

    /// All entries with `seq >= from_seq`, in order.
    pub async fn tail(&self, run_id: &str, from_seq: u64) -> Result<Vec<LogEntry>, LogError> {
        self.store.tail(run_id, from_seq).await
    }

    /// Number of entries appended for `run_id`.
    pub async fn len(&self, run_id: &str) -> Result<u64, LogError> {
        self.store.len(run_id).await
    }

    /// Followers of `run_id` currently waiting on in-process wake-ups.
    pub fn follower_count(&self, run_id: &str) -> usize {
        self.wakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .map_or(0, watch::Sender::receiver_count)
    }

    /// Follow `run_id` starting at `from_seq`. The run need not exist yet;
    /// following it allocates nothing until it does.
    pub fn follow(self: &Arc<Self>, run_id: &str, from_seq: u64) -> LogFollower {
        LogFollower {
            log: Arc::clone(self),
            run_id: run_id.to_owned(),
            next_seq: from_seq,
            changes: self.subscribe(run_id),
            poll_interval: self.config.poll_interval,
        }
    }
}

/// A live observer of one run's log.
pub struct LogFollower {
    log: Arc<RunLog>,
    run_id: String,
    next_seq: u64,
    changes: Option<watch::Receiver<u64>>,
    poll_interval: Duration,
}

impl LogFollower {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Sequence number of the next entry this follower will yield.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Wait for and return the next non-empty batch of entries.
    pub async fn next_batch(&mut self) -> Vec<LogEntry> {
        loop {
            if self.changes.is_none() {
                self.changes = self.log.subscribe(&self.run_id);
            }
            if let Some(changes) = self.changes.as_mut() {
                changes.borrow_and_update();
            }

            match self.log.tail(&self.run_id, self.next_seq).await {
                Ok(batch) if !batch.is_empty() => {
                    self.next_seq += batch.len() as u64;
                    return batch;
                }
                Ok(_) => {}
                Err(e) => warn!(run_id = %self.run_id, "cannot read run log: {}", e),
            }

            self.wait().await;
        }
    }

    async fn wait(&mut self) {
        let poll = self.poll_interval;
        let Some(changes) = self.changes.as_mut() else {
            tokio::time::sleep(poll).await;
            return;
        };
        if let Ok(Err(_)) = tokio::time::timeout(poll, changes.changed()).await {
            // Sender gone: fall back to plain polling.
            self.changes = None;
            tokio::time::sleep(poll).await;
        }
    }
}
