//! Deferred-run queue repository functions.
//!
//! The queue is the `scheduled_runs` table. Workers claim the oldest due
//! row with a conditional `UPDATE`, so two workers sharing one database
//! never claim the same row. A claim is a lease: the holder refreshes
//! `heartbeat_at` while the run executes, and only rows whose heartbeat
//! has gone stale are returned to `pending`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{ScheduledRunRow, ScheduledRunStatus},
    DbError, DbPool,
};

const COLUMNS: &str = "id, workflow_id, run_id, payload, status, attempts, last_error, \
     run_at, created_at, updated_at, claimed_by, heartbeat_at";

/// A run to enqueue.
#[derive(Debug, Clone)]
pub struct NewScheduledRun {
    pub workflow_id: String,
    pub run_id: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
}

/// Insert a new `pending` row.
pub async fn enqueue(pool: &DbPool, new_run: &NewScheduledRun) -> Result<ScheduledRunRow, DbError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp_millis();
    let payload = serde_json::to_string(&new_run.payload)?;

    sqlx::query(
        r#"
        INSERT INTO scheduled_runs
            (id, workflow_id, run_id, payload, status, attempts, run_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new_run.workflow_id)
    .bind(&new_run.run_id)
    .bind(&payload)
    .bind(new_run.run_at.timestamp_millis())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get(pool, &id).await
}

/// Fetch a single row by its primary key.
pub async fn get(pool: &DbPool, id: &str) -> Result<ScheduledRunRow, DbError> {
    sqlx::query_as::<_, ScheduledRunRow>(&format!(
        "SELECT {COLUMNS} FROM scheduled_runs WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Atomically take the oldest row due at `now`, mark it `processing` and
/// record `worker_id` as the lease holder.
///
/// Returns `None` if nothing is due (or another worker won the race).
pub async fn claim_due(
    pool: &DbPool,
    now: DateTime<Utc>,
    worker_id: &str,
) -> Result<Option<ScheduledRunRow>, DbError> {
    let mut tx = pool.begin().await?;

    let candidate = sqlx::query_as::<_, ScheduledRunRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM scheduled_runs
        WHERE status = 'pending' AND run_at <= ?
        ORDER BY run_at ASC, created_at ASC
        LIMIT 1
        "#
    ))
    .bind(now.timestamp_millis())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(mut row) = candidate else {
        tx.rollback().await?;
        return Ok(None);
    };

    let updated_at = Utc::now().timestamp_millis();
    let claimed = sqlx::query(
        r#"
        UPDATE scheduled_runs
        SET status = 'processing', attempts = attempts + 1, updated_at = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(updated_at)
    .bind(&row.id)
    .execute(&mut *tx)
    .await?;

    if claimed.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }
    tx.commit().await?;

    row.status = ScheduledRunStatus::Processing.to_string();
    row.attempts += 1;
    row.updated_at = updated_at;
    row.claimed_by = Some(worker_id.to_owned());
    row.heartbeat_at = Some(updated_at);
    Ok(Some(row))
}

/// Refresh the lease `worker_id` holds on a `processing` row.
///
/// Returns `false` if the worker no longer holds it.
pub async fn heartbeat(
    pool: &DbPool,
    id: &str,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE scheduled_runs
        SET heartbeat_at = ?
        WHERE id = ? AND claimed_by = ? AND status = 'processing'
        "#,
    )
    .bind(now.timestamp_millis())
    .bind(id)
    .bind(worker_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record the final status of a row claimed by `worker_id`.
///
/// Fails with [`DbError::NotFound`] if the row is gone or its lease passed
/// to another worker.
pub async fn finish(
    pool: &DbPool,
    id: &str,
    worker_id: &str,
    status: ScheduledRunStatus,
    last_error: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE scheduled_runs
        SET status = ?, last_error = ?, updated_at = ?, heartbeat_at = NULL
        WHERE id = ? AND claimed_by = ?
        "#,
    )
    .bind(status.as_str())
    .bind(last_error)
    .bind(Utc::now().timestamp_millis())
    .bind(id)
    .bind(worker_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Return `processing` rows whose last heartbeat is older than
/// `stale_before` to `pending`. Their holders are presumed dead.
///
/// Returns the number of rows re-queued.
pub async fn requeue_stale(pool: &DbPool, stale_before: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE scheduled_runs
        SET status = 'pending', claimed_by = NULL, heartbeat_at = NULL, updated_at = ?
        WHERE status = 'processing' AND (heartbeat_at IS NULL OR heartbeat_at < ?)
        "#,
    )
    .bind(Utc::now().timestamp_millis())
    .bind(stale_before.timestamp_millis())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Rows still waiting to fire, soonest first.
pub async fn list_pending(pool: &DbPool) -> Result<Vec<ScheduledRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ScheduledRunRow>(&format!(
        "SELECT {COLUMNS} FROM scheduled_runs WHERE status = 'pending' ORDER BY run_at ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
