//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: signers that make claims and
//! blocks, and a chain builder that makes snapshots with forks.

use bytes::Bytes;

use poet_anchor_core::claim::claim_type;
use poet_anchor_core::{
    build_anchor_payload, AnchorTransaction, Block, BlockId, ChainBlockHash, ChainBlockHeader,
    ChainStateSnapshot, Claim, ClaimBuilder, Ed25519PublicKey, Keypair, TransactionHash,
};
use poet_anchor_store::MemoryStore;

/// A test fixture with a keypair and memory store.
pub struct TestFixture {
    pub keypair: Keypair,
    pub store: MemoryStore,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            store: MemoryStore::new(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            store: MemoryStore::new(),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// A signed Work claim.
    pub fn make_work(&self, name: &str, author: &str) -> Claim {
        ClaimBuilder::new(claim_type::WORK)
            .attribute("name", name)
            .attribute("author", author)
            .attribute("dateCreated", "2017-06-01")
            .sign(&self.keypair)
    }

    /// A block of `count` Work claims tagged with `tag`.
    pub fn make_block(&self, tag: &str, count: usize) -> Block {
        let claims = (0..count.max(1))
            .map(|i| self.make_work(&format!("{tag}-{i}"), "Anonymous"))
            .collect();
        Block::new(claims)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// Builds chain snapshots header by header.
///
/// Header hashes are derived from a branch tag and the height, so two
/// builders with different tags diverge wherever they add their own headers.
#[derive(Debug, Clone)]
pub struct ChainFixture {
    headers: Vec<ChainBlockHeader>,
    anchors: Vec<AnchorTransaction>,
    branch: u8,
}

impl ChainFixture {
    /// A chain whose first header is at `start_height`.
    pub fn new(start_height: u64) -> Self {
        let genesis = ChainBlockHeader {
            height: start_height,
            hash: header_hash(0, start_height),
            parent_hash: ChainBlockHash::ZERO,
            timestamp: timestamp_at(start_height),
        };
        Self {
            headers: vec![genesis],
            anchors: Vec::new(),
            branch: 0,
        }
    }

    /// A copy that keeps everything up to and including `height` and adds
    /// its own headers from there on. The first header is always kept.
    pub fn fork_at(&self, height: u64, branch: u8) -> Self {
        let height = height.max(self.headers[0].height);
        Self {
            headers: self.headers.iter().filter(|h| h.height <= height).copied().collect(),
            anchors: self
                .anchors
                .iter()
                .filter(|a| a.chain_block_height <= height)
                .cloned()
                .collect(),
            branch,
        }
    }

    pub fn tip(&self) -> ChainBlockHeader {
        // Never empty: `new` pushes one header and `fork_at` keeps it.
        self.headers[self.headers.len() - 1]
    }

    /// Add one header on top of the tip.
    pub fn extend(&mut self) -> ChainBlockHeader {
        let parent = self.tip();
        let height = parent.height + 1;
        let header = ChainBlockHeader {
            height,
            hash: header_hash(self.branch, height),
            parent_hash: parent.hash,
            timestamp: timestamp_at(height),
        };
        self.headers.push(header);
        header
    }

    /// Mine an anchor for `block_id` into the current tip.
    pub fn anchor(&mut self, block_id: &BlockId) -> AnchorTransaction {
        let tip = self.tip();
        let mut tx = [0u8; 32];
        tx[..8].copy_from_slice(&tip.height.to_be_bytes());
        tx[8] = self.branch;
        tx[9..].copy_from_slice(&block_id.as_bytes()[..23]);

        let anchor = AnchorTransaction {
            transaction_hash: TransactionHash::from_bytes(tx),
            payload: Bytes::copy_from_slice(&build_anchor_payload(block_id)),
            chain_block_hash: tip.hash,
            chain_block_height: tip.height,
            timestamp: tip.timestamp,
        };
        self.anchors.push(anchor.clone());
        anchor
    }

    /// Mine a foreign (non-anchor) data output into the current tip.
    pub fn foreign(&mut self, payload: &'static [u8]) {
        let tip = self.tip();
        self.anchors.push(AnchorTransaction {
            transaction_hash: TransactionHash::from_bytes([0xf0; 32]),
            payload: Bytes::from_static(payload),
            chain_block_hash: tip.hash,
            chain_block_height: tip.height,
            timestamp: tip.timestamp,
        });
    }

    /// The chain as a snapshot.
    pub fn snapshot(&self) -> ChainStateSnapshot {
        let tip = self.tip();
        ChainStateSnapshot {
            height: tip.height,
            block_hash: tip.hash,
            parent_hash: tip.parent_hash,
            timestamp: tip.timestamp,
            ancestry: self.headers[..self.headers.len() - 1].to_vec(),
            anchors: self.anchors.clone(),
        }
    }
}

fn header_hash(branch: u8, height: u64) -> ChainBlockHash {
    let mut hash = [0u8; 32];
    hash[0] = branch;
    hash[24..].copy_from_slice(&height.to_be_bytes());
    ChainBlockHash::from_bytes(hash)
}

fn timestamp_at(height: u64) -> i64 {
    1_500_000_000 + (height as i64) * 600
}
