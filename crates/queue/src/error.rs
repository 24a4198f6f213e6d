//! Queue-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("cannot encode run request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("delay out of range: {0}")]
    Delay(String),
}
