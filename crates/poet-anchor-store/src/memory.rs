//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use poet_anchor_core::{Block, BlockId, BlockStatus, ChainAnchorRecord, Claim, ClaimId};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Blocks with their status, and insertion order for stable listings.
    blocks: HashMap<BlockId, StoredBlock>,
    next_seq: u64,

    /// Claims indexed by id; the first block that carried a claim wins.
    claims: HashMap<ClaimId, Claim>,

    /// Anchor records keyed by block.
    anchors: HashMap<BlockId, ChainAnchorRecord>,

    last_processed_height: Option<u64>,
}

struct StoredBlock {
    block: Block,
    status: BlockStatus,
    seq: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_claim(&self, id: &ClaimId) -> Result<Option<Claim>> {
        Ok(self.read()?.claims.get(id).cloned())
    }

    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>> {
        Ok(self.read()?.blocks.get(id).map(|s| s.block.clone()))
    }

    async fn get_block_status(&self, id: &BlockId) -> Result<Option<BlockStatus>> {
        Ok(self.read()?.blocks.get(id).map(|s| s.status))
    }

    async fn save_block_seen(&self, block: &Block, _canonical: &[u8]) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if inner.blocks.contains_key(&block.id) {
            return Ok(InsertResult::AlreadyExists);
        }

        for claim in &block.claims {
            inner.claims.entry(claim.id).or_insert_with(|| claim.clone());
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.blocks.insert(
            block.id,
            StoredBlock {
                block: block.clone(),
                status: BlockStatus::Seen,
                seq,
            },
        );

        Ok(InsertResult::Inserted)
    }

    async fn set_block_status(&self, id: &BlockId, status: BlockStatus) -> Result<()> {
        let mut inner = self.write()?;
        match inner.blocks.get_mut(id) {
            Some(stored) => {
                stored.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("block {}", id.to_hex()))),
        }
    }

    async fn find_by_status(&self, status: BlockStatus) -> Result<Vec<BlockId>> {
        let inner = self.read()?;
        let mut matching: Vec<(u64, BlockId)> = inner
            .blocks
            .iter()
            .filter(|(_, s)| s.status == status)
            .map(|(id, s)| (s.seq, *id))
            .collect();
        matching.sort();
        Ok(matching.into_iter().map(|(_, id)| id).collect())
    }

    async fn get_anchor_record(&self, block_id: &BlockId) -> Result<Option<ChainAnchorRecord>> {
        Ok(self.read()?.anchors.get(block_id).cloned())
    }

    async fn save_anchor_record(&self, record: &ChainAnchorRecord) -> Result<()> {
        self.write()?.anchors.insert(record.block_id, record.clone());
        Ok(())
    }

    async fn pending_anchor_records(&self) -> Result<Vec<ChainAnchorRecord>> {
        let inner = self.read()?;
        let mut pending: Vec<ChainAnchorRecord> = inner
            .anchors
            .values()
            .filter(|r| r.timestamp.is_none() && !r.retracted)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        Ok(pending)
    }

    async fn confirm_block(&self, record: &ChainAnchorRecord) -> Result<()> {
        let mut inner = self.write()?;
        let Some(stored) = inner.blocks.get_mut(&record.block_id) else {
            return Err(StoreError::NotFound(format!("block {}", record.block_id.to_hex())));
        };
        stored.status = BlockStatus::Confirmed;
        inner.anchors.insert(record.block_id, record.clone());
        Ok(())
    }

    async fn retract_block(&self, block_id: &BlockId) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.anchors.get_mut(block_id) {
            Some(record) if !record.retracted => record.retracted = true,
            _ => return Ok(false),
        }
        if let Some(stored) = inner.blocks.get_mut(block_id) {
            if stored.status == BlockStatus::Confirmed {
                stored.status = BlockStatus::Seen;
            }
        }
        Ok(true)
    }

    async fn get_last_processed_height(&self) -> Result<Option<u64>> {
        Ok(self.read()?.last_processed_height)
    }

    async fn set_last_processed_height(&self, height: u64) -> Result<u64> {
        let mut inner = self.write()?;
        let stored = inner.last_processed_height.map_or(height, |h| h.max(height));
        inner.last_processed_height = Some(stored);
        Ok(stored)
    }
}
