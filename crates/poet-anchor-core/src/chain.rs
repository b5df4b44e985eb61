//! Chain data model: headers, observed anchors, snapshots and anchor records.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::anchor::parse_anchor_payload;
use crate::error::CoreError;
use crate::types::{BlockId, ChainBlockHash, TransactionHash};

/// Header of a mined chain block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBlockHeader {
    pub height: u64,
    pub hash: ChainBlockHash,
    pub parent_hash: ChainBlockHash,
    /// Unix seconds.
    pub timestamp: i64,
}

impl ChainBlockHeader {
    /// Whether `self` directly extends `parent`.
    pub fn extends(&self, parent: &ChainBlockHeader) -> bool {
        self.height == parent.height + 1 && self.parent_hash == parent.hash
    }
}

/// A mined chain transaction carrying auxiliary data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTransaction {
    pub transaction_hash: TransactionHash,
    /// Raw auxiliary bytes; may belong to another protocol.
    pub payload: Bytes,
    pub chain_block_hash: ChainBlockHash,
    pub chain_block_height: u64,
    /// Unix seconds of the containing chain block.
    pub timestamp: i64,
}

impl AnchorTransaction {
    /// The anchored block id, if the payload is ours.
    pub fn block_id(&self) -> Result<Option<BlockId>, CoreError> {
        parse_anchor_payload(&self.payload)
    }
}

/// The chain as seen at one poll: tip, recent ancestry and observed anchors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStateSnapshot {
    pub height: u64,
    pub block_hash: ChainBlockHash,
    pub parent_hash: ChainBlockHash,
    pub timestamp: i64,
    /// Headers strictly below the tip, ascending by height.
    pub ancestry: Vec<ChainBlockHeader>,
    /// Anchor transactions at or below `height`, in chain order.
    pub anchors: Vec<AnchorTransaction>,
}

impl ChainStateSnapshot {
    /// The tip as a header.
    pub fn tip(&self) -> ChainBlockHeader {
        ChainBlockHeader {
            height: self.height,
            hash: self.block_hash,
            parent_hash: self.parent_hash,
            timestamp: self.timestamp,
        }
    }

    /// Tip first, then ancestry from newest to oldest.
    pub fn headers_newest_first(&self) -> impl Iterator<Item = ChainBlockHeader> + '_ {
        std::iter::once(self.tip()).chain(self.ancestry.iter().rev().copied())
    }

    /// Height of the header with this hash, if the snapshot knows it.
    pub fn height_of(&self, hash: &ChainBlockHash) -> Option<u64> {
        self.headers_newest_first()
            .find(|h| &h.hash == hash)
            .map(|h| h.height)
    }

    /// Anchors mined strictly above `height`.
    pub fn anchors_above(&self, height: u64) -> impl Iterator<Item = &AnchorTransaction> {
        self.anchors
            .iter()
            .filter(move |a| a.chain_block_height > height)
    }

    /// Anchors mined at or below `height`.
    pub fn anchors_at_or_below(&self, height: u64) -> impl Iterator<Item = &AnchorTransaction> {
        self.anchors
            .iter()
            .filter(move |a| a.chain_block_height <= height)
    }
}

/// Processing state of a block. Absence from the store means unseen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Seen,
    RetryPending,
    Confirmed,
}

impl BlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockStatus::Seen => "seen",
            BlockStatus::RetryPending => "retry_pending",
            BlockStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seen" => Ok(BlockStatus::Seen),
            "retry_pending" => Ok(BlockStatus::RetryPending),
            "confirmed" => Ok(BlockStatus::Confirmed),
            other => Err(CoreError::decode(format!("unknown block status {other:?}"))),
        }
    }
}

/// Where and when a block was anchored.
///
/// Chain fields stay empty until the transaction is mined; `timestamp` is set
/// only once the block is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAnchorRecord {
    pub block_id: BlockId,
    pub transaction_hash: TransactionHash,
    pub chain_block_hash: Option<ChainBlockHash>,
    pub chain_block_height: Option<u64>,
    pub timestamp: Option<i64>,
    pub retracted: bool,
}

impl ChainAnchorRecord {
    /// A broadcast anchor that has not been mined yet.
    pub fn pending(block_id: BlockId, transaction_hash: TransactionHash) -> Self {
        Self {
            block_id,
            transaction_hash,
            chain_block_hash: None,
            chain_block_height: None,
            timestamp: None,
            retracted: false,
        }
    }

    /// A record for an anchor observed in a mined chain block.
    pub fn mined(block_id: BlockId, anchor: &AnchorTransaction) -> Self {
        Self {
            block_id,
            transaction_hash: anchor.transaction_hash,
            chain_block_hash: Some(anchor.chain_block_hash),
            chain_block_height: Some(anchor.chain_block_height),
            timestamp: Some(anchor.timestamp),
            retracted: false,
        }
    }

    /// Whether the record carries a live confirmation.
    pub fn is_confirmed(&self) -> bool {
        self.timestamp.is_some() && !self.retracted
    }
}
