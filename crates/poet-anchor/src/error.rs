//! Error types for the node.

use poet_anchor_core::{CoreError, ValidationError};
use poet_anchor_queue::QueueError;
use poet_anchor_store::StoreError;
use poet_anchor_sync::{ChainClientError, SyncError};
use thiserror::Error;

use crate::relay::RequestId;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A submitted block or claim is invalid. Not retried.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Bytes that do not decode.
    #[error("decode error: {0}")]
    Decode(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Processing error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Chain client error.
    #[error("chain client error: {0}")]
    Chain(#[from] ChainClientError),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// No live sign request with this id.
    #[error("unknown sign request: {0}")]
    UnknownRequest(RequestId),

    /// The node is already running or already stopped.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl NodeError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NodeError::Store(e) => e.is_transient(),
            NodeError::Queue(e) => e.is_transient(),
            NodeError::Sync(e) => e.is_transient(),
            NodeError::Chain(_) => true,
            _ => false,
        }
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
