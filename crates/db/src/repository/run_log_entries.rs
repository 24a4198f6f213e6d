//! Run log repository functions.
//!
//! Sequence numbers are assigned inside the `INSERT`, so appends for the
//! same run stay gap-free even when they come from different processes.

use chrono::{DateTime, Utc};

use crate::{models::RunLogEntryRow, DbError, DbPool};

/// Append `text` as the next entry of `run_id`.
pub async fn append(
    pool: &DbPool,
    run_id: &str,
    text: &str,
    logged_at: DateTime<Utc>,
) -> Result<RunLogEntryRow, DbError> {
    let row = sqlx::query_as::<_, RunLogEntryRow>(
        r#"
        INSERT INTO run_log_entries (run_id, seq, logged_at, text)
        SELECT ?, COALESCE(MAX(seq) + 1, 0), ?, ?
        FROM run_log_entries
        WHERE run_id = ?
        RETURNING run_id, seq, logged_at, text
        "#,
    )
    .bind(run_id)
    .bind(logged_at.timestamp_millis())
    .bind(text)
    .bind(run_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Entries of `run_id` with `seq >= from_seq`, in order.
pub async fn tail(pool: &DbPool, run_id: &str, from_seq: i64) -> Result<Vec<RunLogEntryRow>, DbError> {
    let rows = sqlx::query_as::<_, RunLogEntryRow>(
        r#"
        SELECT run_id, seq, logged_at, text
        FROM run_log_entries
        WHERE run_id = ? AND seq >= ?
        ORDER BY seq ASC
        "#,
    )
    .bind(run_id)
    .bind(from_seq)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Number of entries stored for `run_id`.
pub async fn count(pool: &DbPool, run_id: &str) -> Result<i64, DbError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM run_log_entries WHERE run_id = ?")
        .bind(run_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
