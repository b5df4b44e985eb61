//! Reorg detection between two chain state snapshots.
//!
//! The detector is pure: it compares what was seen at the previous poll with
//! what is seen now and says which anchors have to be retracted and which
//! newly confirmed. Applying the delta is the processor's job.

use std::collections::{BTreeMap, BTreeSet};

use poet_anchor_core::{AnchorTransaction, BlockId, ChainBlockHash, ChainBlockHeader, ChainStateSnapshot};

use crate::error::{Result, SyncError};

/// Configuration for reorg detection.
#[derive(Debug, Clone)]
pub struct ReorgConfig {
    /// How many headers of the current chain are searched for a common
    /// ancestor before giving up.
    pub lookback_window: usize,
}

impl Default for ReorgConfig {
    fn default() -> Self {
        Self { lookback_window: 100 }
    }
}

/// What changed between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgDelta {
    /// Newest header present on both chains.
    pub common_ancestor: ChainBlockHeader,
    /// Blocks anchored on the abandoned branch. Only records that point into
    /// `abandoned` are retracted.
    pub retract: BTreeSet<BlockId>,
    /// Anchors to confirm: those on the new branch for blocks not anchored
    /// below the ancestor, plus the settled anchor of any block in `retract`
    /// that also has one.
    pub confirm: BTreeMap<BlockId, AnchorTransaction>,
    /// Header hashes of `previous` above the ancestor.
    pub abandoned: BTreeSet<ChainBlockHash>,
    /// Header hashes of `current` above the ancestor.
    pub adopted: BTreeSet<ChainBlockHash>,
}

impl ReorgDelta {
    pub fn is_empty(&self) -> bool {
        self.retract.is_empty() && self.confirm.is_empty() && self.abandoned.is_empty()
    }
}

/// Compares consecutive chain snapshots.
pub struct ReorgDetector {
    config: ReorgConfig,
}

impl ReorgDetector {
    pub fn new(config: ReorgConfig) -> Self {
        Self { config }
    }

    /// Compute the delta from `previous` to `current`.
    ///
    /// Returns `SyncError::ReorgTooDeep` when none of the newest
    /// `lookback_window` headers of `current` appear in `previous`.
    pub fn diff(&self, previous: &ChainStateSnapshot, current: &ChainStateSnapshot) -> Result<ReorgDelta> {
        let common_ancestor = current
            .headers_newest_first()
            .take(self.config.lookback_window)
            .find(|h| previous.height_of(&h.hash).is_some())
            .ok_or(SyncError::ReorgTooDeep {
                window: self.config.lookback_window,
                previous_tip: previous.height,
                current_tip: current.height,
            })?;
        let fork_height = common_ancestor.height;

        let retract: BTreeSet<BlockId> = previous
            .anchors_above(fork_height)
            .filter_map(anchored_block)
            .map(|(id, _)| id)
            .collect();

        // Below the ancestor both chains agree; the first anchor per block wins.
        let mut settled: BTreeMap<BlockId, &AnchorTransaction> = BTreeMap::new();
        for (id, anchor) in current.anchors_at_or_below(fork_height).filter_map(anchored_block) {
            settled.entry(id).or_insert(anchor);
        }
        for (id, anchor) in previous.anchors_at_or_below(fork_height).filter_map(anchored_block) {
            settled.entry(id).or_insert(anchor);
        }

        let mut confirm = BTreeMap::new();
        for (id, anchor) in current.anchors_above(fork_height).filter_map(anchored_block) {
            if !settled.contains_key(&id) {
                confirm.entry(id).or_insert_with(|| anchor.clone());
            }
        }
        // A retracted record may have pointed at the abandoned copy of a
        // block that is still anchored below the fork.
        for id in &retract {
            if let Some(anchor) = settled.get(id) {
                confirm.entry(*id).or_insert_with(|| (*anchor).clone());
            }
        }

        let abandoned = branch_above(previous, fork_height);
        let adopted = branch_above(current, fork_height);

        let depth = previous.height.saturating_sub(fork_height);
        if !retract.is_empty() {
            tracing::warn!(
                depth,
                at = fork_height,
                retracted = retract.len(),
                confirmed = confirm.len(),
                "Reorg detected"
            );
        } else {
            tracing::debug!(at = fork_height, confirmed = confirm.len(), "chain advanced");
        }

        Ok(ReorgDelta {
            common_ancestor,
            retract,
            confirm,
            abandoned,
            adopted,
        })
    }
}

fn branch_above(snapshot: &ChainStateSnapshot, height: u64) -> BTreeSet<ChainBlockHash> {
    snapshot
        .headers_newest_first()
        .take_while(|h| h.height > height)
        .map(|h| h.hash)
        .collect()
}

/// Block id of an anchor that carries our payload. Foreign and malformed
/// payloads are skipped here; the processor reports malformed ones.
fn anchored_block(anchor: &AnchorTransaction) -> Option<(BlockId, &AnchorTransaction)> {
    match anchor.block_id() {
        Ok(Some(id)) => Some((id, anchor)),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(tx = %anchor.transaction_hash, error = %e, "skipping malformed anchor");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use poet_anchor_core::{build_anchor_payload, ChainBlockHash, TransactionHash};
    use proptest::prelude::*;

    fn header(height: u64, tag: u8) -> ChainBlockHeader {
        ChainBlockHeader {
            height,
            hash: ChainBlockHash::from_bytes([tag; 32]),
            parent_hash: ChainBlockHash::ZERO,
            timestamp: 1_500_000_000 + height as i64,
        }
    }

    fn anchor(block: u8, at: &ChainBlockHeader) -> AnchorTransaction {
        AnchorTransaction {
            transaction_hash: TransactionHash::from_bytes([block; 32]),
            payload: Bytes::copy_from_slice(&build_anchor_payload(&BlockId::from_bytes([block; 32]))),
            chain_block_hash: at.hash,
            chain_block_height: at.height,
            timestamp: at.timestamp,
        }
    }

    /// A snapshot whose last header is the tip.
    fn snapshot(headers: &[ChainBlockHeader], anchors: Vec<AnchorTransaction>) -> ChainStateSnapshot {
        let (tip, ancestry) = headers.split_last().unwrap();
        ChainStateSnapshot {
            height: tip.height,
            block_hash: tip.hash,
            parent_hash: ancestry.last().map_or(ChainBlockHash::ZERO, |h| h.hash),
            timestamp: tip.timestamp,
            ancestry: ancestry.to_vec(),
            anchors,
        }
    }

    fn block(tag: u8) -> BlockId {
        BlockId::from_bytes([tag; 32])
    }

    const A: u8 = 0xa;
    const B: u8 = 0xb;
    const C: u8 = 0xc;

    #[test]
    fn test_fork_retracts_abandoned_branch() {
        let h9 = header(9, 9);
        let h10 = header(10, 10);
        let h11 = header(11, 11);
        let h11_fork = header(11, 0x11);
        let h12_fork = header(12, 0x12);

        let previous = snapshot(&[h9, h10, h11], vec![anchor(A, &h10), anchor(B, &h11)]);
        let current = snapshot(&[h9, h10, h11_fork, h12_fork], vec![anchor(A, &h10), anchor(C, &h11_fork)]);

        let delta = ReorgDetector::new(ReorgConfig::default()).diff(&previous, &current).unwrap();
        assert_eq!(delta.common_ancestor, h10);
        assert_eq!(delta.retract, BTreeSet::from([block(B)]));
        assert_eq!(delta.confirm.keys().copied().collect::<Vec<_>>(), vec![block(C)]);
        assert_eq!(delta.confirm[&block(C)].chain_block_hash, h11_fork.hash);
    }

    #[test]
    fn test_extension_confirms_new_anchors_only() {
        let h10 = header(10, 10);
        let h11 = header(11, 11);
        let previous = snapshot(&[h10], vec![anchor(A, &h10)]);
        let current = snapshot(&[h10, h11], vec![anchor(A, &h10), anchor(B, &h11)]);

        let delta = ReorgDetector::new(ReorgConfig::default()).diff(&previous, &current).unwrap();
        assert_eq!(delta.common_ancestor, h10);
        assert!(delta.retract.is_empty());
        assert_eq!(delta.confirm.keys().copied().collect::<Vec<_>>(), vec![block(B)]);
    }

    #[test]
    fn test_same_snapshot_is_empty_delta() {
        let h10 = header(10, 10);
        let snap = snapshot(&[h10], vec![anchor(A, &h10)]);
        let delta = ReorgDetector::new(ReorgConfig::default()).diff(&snap, &snap).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_reanchored_below_fork_is_not_confirmed_again() {
        let h10 = header(10, 10);
        let h11 = header(11, 11);
        let h11_fork = header(11, 0x11);
        let previous = snapshot(&[h10, h11], vec![anchor(A, &h10)]);
        // A second anchor for A on the new branch.
        let mut again = anchor(A, &h11_fork);
        again.transaction_hash = TransactionHash::from_bytes([0xee; 32]);
        let current = snapshot(&[h10, h11_fork], vec![anchor(A, &h10), again]);

        let delta = ReorgDetector::new(ReorgConfig::default()).diff(&previous, &current).unwrap();
        assert!(delta.confirm.is_empty());
    }

    #[test]
    fn test_retracted_block_falls_back_to_settled_anchor() {
        let h5 = header(5, 5);
        let h10 = header(10, 10);
        let h11 = header(11, 11);
        let h11_fork = header(11, 0x11);
        let h12_fork = header(12, 0x12);
        let mut again = anchor(B, &h11);
        again.transaction_hash = TransactionHash::from_bytes([0xdd; 32]);
        let previous = snapshot(&[h5, h10, h11], vec![anchor(B, &h5), again]);
        let current = snapshot(&[h5, h10, h11_fork, h12_fork], vec![anchor(B, &h5)]);

        let delta = ReorgDetector::new(ReorgConfig::default()).diff(&previous, &current).unwrap();
        assert_eq!(delta.retract, BTreeSet::from([block(B)]));
        assert_eq!(delta.confirm[&block(B)].chain_block_hash, h5.hash);
        assert_eq!(delta.abandoned, BTreeSet::from([h11.hash]));
        assert_eq!(delta.adopted, BTreeSet::from([h11_fork.hash, h12_fork.hash]));
    }

    #[test]
    fn test_no_common_ancestor_is_too_deep() {
        let previous = snapshot(&[header(10, 10), header(11, 11)], vec![]);
        let current = snapshot(&[header(10, 0x10), header(11, 0x11)], vec![]);

        let err = ReorgDetector::new(ReorgConfig::default())
            .diff(&previous, &current)
            .unwrap_err();
        assert!(matches!(err, SyncError::ReorgTooDeep { previous_tip: 11, current_tip: 11, .. }));
    }

    #[test]
    fn test_ancestor_outside_window_is_too_deep() {
        let h8 = header(8, 8);
        let previous = snapshot(&[h8, header(9, 9)], vec![]);
        let current = snapshot(&[h8, header(9, 0x09), header(10, 0x10), header(11, 0x11)], vec![]);

        let detector = ReorgDetector::new(ReorgConfig { lookback_window: 3 });
        assert!(matches!(
            detector.diff(&previous, &current),
            Err(SyncError::ReorgTooDeep { window: 3, .. })
        ));

        let detector = ReorgDetector::new(ReorgConfig { lookback_window: 4 });
        assert_eq!(detector.diff(&previous, &current).unwrap().common_ancestor, h8);
    }

    #[test]
    fn test_foreign_payloads_ignored() {
        let h10 = header(10, 10);
        let h11 = header(11, 11);
        let mut foreign = anchor(B, &h11);
        foreign.payload = Bytes::from_static(b"OMNI\x00\x00\x00\x01");
        let previous = snapshot(&[h10], vec![]);
        let current = snapshot(&[h10, h11], vec![foreign]);

        let delta = ReorgDetector::new(ReorgConfig::default()).diff(&previous, &current).unwrap();
        assert!(delta.is_empty());
    }

    proptest! {
        #[test]
        fn test_fork_at_any_height(len in 2u8..20, fork in 0u8..20, extra in 1u8..5) {
            let fork = fork % len;
            let main: Vec<_> = (0..len).map(|i| header(i as u64, i)).collect();
            let mut branch = main[..=fork as usize].to_vec();
            branch.extend((fork + 1..=fork + extra).map(|i| header(i as u64, 0x80 | i)));

            let main_anchors: Vec<_> = main.iter().map(|h| anchor(h.height as u8, h)).collect();
            let mut branch_anchors = main_anchors[..=fork as usize].to_vec();
            branch_anchors.extend(branch[fork as usize + 1..].iter().map(|h| anchor(0x40 | h.height as u8, h)));

            let previous = snapshot(&main, main_anchors);
            let current = snapshot(&branch, branch_anchors);
            let delta = ReorgDetector::new(ReorgConfig::default()).diff(&previous, &current).unwrap();

            prop_assert_eq!(delta.common_ancestor, main[fork as usize]);
            prop_assert_eq!(delta.retract, (fork + 1..len).map(block).collect::<BTreeSet<_>>());
            prop_assert_eq!(
                delta.confirm.into_keys().collect::<BTreeSet<_>>(),
                (fork + 1..=fork + extra).map(|i| block(0x40 | i)).collect::<BTreeSet<_>>()
            );
        }
    }
}
