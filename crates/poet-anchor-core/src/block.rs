//! Blocks: ordered batches of claims, anchored on-chain by id.

use crate::canonical::{content_hash, encode_block_preimage};
use crate::claim::Claim;
use crate::types::BlockId;

/// A batch of claims. Claim order is significant for the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Hash of the canonical encoding with the id emptied.
    pub id: BlockId,

    /// Claims in batch order.
    pub claims: Vec<Claim>,
}

impl Block {
    /// Batch claims into a block and compute its id.
    pub fn new(claims: Vec<Claim>) -> Self {
        let mut block = Self {
            id: BlockId::ZERO,
            claims,
        };
        block.id = block.compute_id();
        block
    }

    /// Recompute the id from the claims.
    pub fn compute_id(&self) -> BlockId {
        BlockId(content_hash(&encode_block_preimage(self)).0)
    }

    /// Number of claims.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether the block carries no claims.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimBuilder;
    use crate::crypto::Keypair;

    fn claims() -> Vec<Claim> {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        vec![
            ClaimBuilder::new("Work").attribute("name", "one").sign(&keypair),
            ClaimBuilder::new("Work").attribute("name", "two").sign(&keypair),
        ]
    }

    #[test]
    fn test_block_id_deterministic() {
        let a = Block::new(claims());
        let b = Block::new(claims());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, a.compute_id());
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_claim_order_is_significant() {
        let mut reversed = claims();
        reversed.reverse();
        assert_ne!(Block::new(claims()).id, Block::new(reversed).id);
    }
}
