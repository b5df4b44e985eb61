//! Error types for the Poet Anchor core.

use thiserror::Error;

use crate::types::{BlockId, ClaimId};

/// Core errors that can occur while encoding, decoding or signing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("decode error: {0}")]
    Decode(String),
}

impl CoreError {
    /// Shorthand for a decode failure.
    pub fn decode(msg: impl Into<String>) -> Self {
        CoreError::Decode(msg.into())
    }
}

/// Validation errors for claims and blocks.
///
/// All of these are permanent: retrying the same bytes cannot succeed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed for claim {0}")]
    SignatureFailed(ClaimId),

    #[error("claim id mismatch: declared {declared}, computed {computed}")]
    ClaimIdMismatch { declared: ClaimId, computed: ClaimId },

    #[error("block id mismatch: declared {declared}, computed {computed}")]
    BlockIdMismatch { declared: BlockId, computed: BlockId },

    #[error("block {0} contains no claims")]
    EmptyBlock(BlockId),

    #[error("claim type must not be empty")]
    EmptyClaimType,

    #[error("decode error: {0}")]
    Decode(#[from] CoreError),
}
