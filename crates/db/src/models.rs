//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models; they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// scheduled_runs
// ---------------------------------------------------------------------------

/// Possible statuses for a scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledRunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ScheduledRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ScheduledRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScheduledRunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"    => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed"  => Ok(Self::Completed),
            "failed"     => Ok(Self::Failed),
            other        => Err(format!("unknown scheduled run status: {other}")),
        }
    }
}

/// A deferred run waiting in (or finished with) the queue.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledRunRow {
    pub id: String,
    pub workflow_id: String,
    pub run_id: String,
    /// JSON-encoded run request.
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    /// Unix milliseconds.
    pub run_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    /// Worker holding the claim while `processing`.
    pub claimed_by: Option<String>,
    /// Unix milliseconds of the holder's last heartbeat.
    pub heartbeat_at: Option<i64>,
}

impl ScheduledRunRow {
    pub fn status(&self) -> Option<ScheduledRunStatus> {
        self.status.parse().ok()
    }

    pub fn run_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.run_at)
    }

    /// Decode the payload into the caller's request type.
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

// ---------------------------------------------------------------------------
// run_log_entries
// ---------------------------------------------------------------------------

/// One stored line of a run's log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunLogEntryRow {
    pub run_id: String,
    pub seq: i64,
    /// Unix milliseconds.
    pub logged_at: i64,
    pub text: String,
}

impl RunLogEntryRow {
    pub fn logged_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.logged_at)
    }
}
