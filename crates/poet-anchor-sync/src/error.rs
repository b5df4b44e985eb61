//! Error types for the sync module.

use thiserror::Error;

use poet_anchor_core::{CoreError, ValidationError};
use poet_anchor_queue::QueueError;
use poet_anchor_store::StoreError;

/// Errors reported by a [`ChainClient`](crate::ChainClient).
#[derive(Debug, Error)]
pub enum ChainClientError {
    /// The node could not be reached or timed out.
    #[error("chain client unavailable: {0}")]
    Unavailable(String),

    /// The node refused the request (e.g. a transaction was rejected).
    #[error("rejected by chain node: {0}")]
    Rejected(String),

    /// The node answered with data we cannot interpret.
    #[error("malformed chain response: {0}")]
    Malformed(String),
}

/// Errors from building or broadcasting an anchor transaction.
///
/// All are transient from the processor's point of view: the work item is
/// redriven and a fresh transaction is built next time.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The anchor address has no spendable outputs.
    #[error("insufficient funds at {address}")]
    InsufficientFunds { address: String },

    /// The outputs at the anchor address add up to more than a `u64` holds.
    #[error("unspent outputs at {address} overflow the change value")]
    ValueOverflow { address: String },

    /// The chain node did not accept the transaction.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// Fetching unspent outputs failed.
    #[error("chain client error: {0}")]
    Client(#[from] ChainClientError),
}

/// Errors that can occur while processing blocks and chain state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No common ancestor between two snapshots within the lookback window.
    #[error("reorg deeper than {window} blocks (previous tip {previous_tip}, current tip {current_tip})")]
    ReorgTooDeep {
        window: usize,
        previous_tip: u64,
        current_tip: u64,
    },

    /// Bytes that do not decode, or an anchor payload with our magic and a
    /// bad version.
    #[error("decode error: {0}")]
    Decode(#[from] CoreError),

    /// Claim or block validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Queue operation failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Anchoring failed.
    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// Chain client call failed.
    #[error("chain client error: {0}")]
    Chain(#[from] ChainClientError),
}

impl SyncError {
    /// Whether redriving the same work item later may succeed.
    ///
    /// Decode and validation failures are permanent. A reorg that is too
    /// deep needs an operator.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_transient(),
            SyncError::Queue(e) => e.is_transient(),
            SyncError::Anchor(_) | SyncError::Chain(_) => true,
            SyncError::Decode(_) | SyncError::Validation(_) | SyncError::ReorgTooDeep { .. } => {
                false
            }
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
