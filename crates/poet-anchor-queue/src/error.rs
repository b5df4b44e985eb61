//! Error types for the queue.

use poet_anchor_core::CoreError;
use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue cannot accept work right now (closed, full or backing
    /// store failure). The caller keeps the event.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// The queue was closed while waiting for work.
    #[error("queue closed")]
    Closed,

    /// Ack or nack for an id that is not in flight.
    #[error("unknown delivery {0}")]
    UnknownDelivery(u64),

    /// A stored event no longer decodes.
    #[error("event codec error: {0}")]
    Codec(#[from] CoreError),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl QueueError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Unavailable(_) | QueueError::Database(_))
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
