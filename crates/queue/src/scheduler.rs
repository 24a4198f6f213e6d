//! Enqueue runs for later execution.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use db::models::ScheduledRunRow;
use db::repository::scheduled_runs::{self, NewScheduledRun};
use db::DbPool;
use engine::RunRequest;

use crate::QueueError;

/// Returned to the caller once a run is durably queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAck {
    pub schedule_id: String,
    /// Run id the log will be written under once the run fires.
    pub run_id: String,
    pub run_at: DateTime<Utc>,
}

/// Writes deferred runs to the `scheduled_runs` table.
#[derive(Debug, Clone)]
pub struct DeferredScheduler {
    pool: DbPool,
}

impl DeferredScheduler {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Queue `request` to run once `delay` has elapsed.
    ///
    /// Requests without a run id get a fresh one, so scheduling the same
    /// workflow twice yields two independent runs.
    #[instrument(skip(self, request), fields(workflow_id = %request.workflow_id))]
    pub async fn schedule(
        &self,
        mut request: RunRequest,
        delay: Duration,
    ) -> Result<ScheduleAck, QueueError> {
        let delay = chrono::Duration::from_std(delay).map_err(|e| QueueError::Delay(e.to_string()))?;
        let run_at = Utc::now()
            .checked_add_signed(delay)
            .ok_or_else(|| QueueError::Delay("run time overflows".into()))?;
        let run_id = request
            .run_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let row = scheduled_runs::enqueue(
            &self.pool,
            &NewScheduledRun {
                workflow_id: request.workflow_id.clone(),
                run_id: run_id.clone(),
                payload: serde_json::to_value(&request)?,
                run_at,
            },
        )
        .await?;

        info!(schedule_id = %row.id, %run_id, %run_at, "run scheduled");
        Ok(ScheduleAck {
            schedule_id: row.id,
            run_id,
            run_at,
        })
    }

    /// Runs still waiting to fire.
    pub async fn pending(&self) -> Result<Vec<ScheduledRunRow>, QueueError> {
        Ok(scheduled_runs::list_pending(&self.pool).await?)
    }
}
