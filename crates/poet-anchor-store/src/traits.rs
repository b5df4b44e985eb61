//! Store trait: the abstract interface for claim, block and anchor persistence.
//!
//! The store is the single source of truth for block state. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use poet_anchor_core::{Block, BlockId, BlockStatus, ChainAnchorRecord, Claim, ClaimId};

use crate::error::Result;

/// Result of saving a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Block, claims and `Seen` status were written.
    Inserted,
    /// The block was already known (idempotent - not an error).
    AlreadyExists,
}

/// The Store trait: async interface for block state persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Idempotent saves**: Saving a known block returns `AlreadyExists`.
/// - **Atomic transitions**: `save_block_seen`, `confirm_block` and
///   `retract_block` each write all their rows or none.
/// - **Monotonic checkpoint**: the last processed height never decreases.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Claims and Blocks
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a claim by id.
    async fn get_claim(&self, id: &ClaimId) -> Result<Option<Claim>>;

    /// Get a block by id.
    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>>;

    /// Get the processing status of a block. `None` means unseen.
    async fn get_block_status(&self, id: &BlockId) -> Result<Option<BlockStatus>>;

    /// Persist a block, its claims and the `Seen` status in one step.
    ///
    /// # Arguments
    /// - `block`: The decoded, validated block.
    /// - `canonical`: Its canonical bytes (kept to avoid re-encoding).
    async fn save_block_seen(&self, block: &Block, canonical: &[u8]) -> Result<InsertResult>;

    /// Overwrite the status of a known block.
    async fn set_block_status(&self, id: &BlockId, status: BlockStatus) -> Result<()>;

    /// All block ids currently in `status`.
    async fn find_by_status(&self, status: BlockStatus) -> Result<Vec<BlockId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Anchor Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the anchor record for a block.
    async fn get_anchor_record(&self, block_id: &BlockId) -> Result<Option<ChainAnchorRecord>>;

    /// Insert or replace the anchor record for `record.block_id`.
    async fn save_anchor_record(&self, record: &ChainAnchorRecord) -> Result<()>;

    /// Records that were broadcast but never confirmed, and are not retracted.
    async fn pending_anchor_records(&self) -> Result<Vec<ChainAnchorRecord>>;

    /// Write the record and mark the block `Confirmed` in one step.
    ///
    /// The block must already be known.
    async fn confirm_block(&self, record: &ChainAnchorRecord) -> Result<()>;

    /// Mark the anchor record retracted and move a confirmed block back to
    /// `Seen` in one step. Returns `false` if there was nothing to retract.
    async fn retract_block(&self, block_id: &BlockId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Checkpoint
    // ─────────────────────────────────────────────────────────────────────────

    /// The last chain height whose anchors were fully processed.
    async fn get_last_processed_height(&self) -> Result<Option<u64>>;

    /// Advance the checkpoint. Lower heights are ignored; returns the stored
    /// height after the call.
    async fn set_last_processed_height(&self, height: u64) -> Result<u64>;
}
