//! Queue error types.
//!
//! Queue mutations report outcomes as booleans; errors only arise at
//! the serialization boundary.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
