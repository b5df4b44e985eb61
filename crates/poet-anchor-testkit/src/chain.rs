//! An in-memory chain client for tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use poet_anchor_core::{AnchorTransaction, ChainStateSnapshot, TransactionHash};
use poet_anchor_sync::{ChainClient, ChainClientError, UnsignedTransaction, Utxo};

/// Scriptable [`ChainClient`].
///
/// Tests set the snapshot the chain reports, fund the anchor address and
/// decide where broadcast transactions get mined.
#[derive(Default)]
pub struct MockChainClient {
    state: Mutex<MockChainState>,
}

#[derive(Default)]
struct MockChainState {
    snapshot: Option<ChainStateSnapshot>,
    utxos: Vec<Utxo>,
    broadcasts: Vec<UnsignedTransaction>,
    mined: HashMap<TransactionHash, AnchorTransaction>,
    reject_broadcasts: bool,
    unavailable: bool,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report `snapshot` from now on.
    pub fn set_snapshot(&self, snapshot: ChainStateSnapshot) {
        self.lock().snapshot = Some(snapshot);
    }

    /// Add a spendable output of `value`.
    pub fn fund(&self, value: u64) {
        let mut state = self.lock();
        let n = state.utxos.len() as u8;
        state.utxos.push(Utxo {
            transaction_hash: TransactionHash::from_bytes([n; 32]),
            output_index: 0,
            value,
        });
    }

    /// Make `get_block_info_by_anchor_hash` report `anchor` as mined.
    pub fn mine(&self, anchor: AnchorTransaction) {
        self.lock().mined.insert(anchor.transaction_hash, anchor);
    }

    pub fn reject_broadcasts(&self, reject: bool) {
        self.lock().reject_broadcasts = reject;
    }

    /// Fail every call with `ChainClientError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Everything broadcast so far, oldest first.
    pub fn broadcasts(&self) -> Vec<UnsignedTransaction> {
        self.lock().broadcasts.clone()
    }

    fn check_available(state: &MockChainState) -> Result<(), ChainClientError> {
        if state.unavailable {
            return Err(ChainClientError::Unavailable("mock chain offline".into()));
        }
        Ok(())
    }
}

/// Deterministic hash for the n-th broadcast.
pub fn broadcast_hash(n: usize) -> TransactionHash {
    let mut bytes = [0xbb; 32];
    bytes[24..].copy_from_slice(&(n as u64).to_be_bytes());
    TransactionHash::from_bytes(bytes)
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_unspent_outputs(&self, _address: &str) -> Result<Vec<Utxo>, ChainClientError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.utxos.clone())
    }

    async fn broadcast(&self, tx: &UnsignedTransaction) -> Result<TransactionHash, ChainClientError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        if state.reject_broadcasts {
            return Err(ChainClientError::Rejected("mempool rejected transaction".into()));
        }
        state.broadcasts.push(tx.clone());
        Ok(broadcast_hash(state.broadcasts.len() - 1))
    }

    async fn get_chain_state_snapshot(&self) -> Result<ChainStateSnapshot, ChainClientError> {
        let state = self.lock();
        Self::check_available(&state)?;
        state
            .snapshot
            .clone()
            .ok_or_else(|| ChainClientError::Unavailable("no snapshot set".into()))
    }

    async fn get_block_info_by_anchor_hash(
        &self,
        transaction_hash: &TransactionHash,
    ) -> Result<Option<AnchorTransaction>, ChainClientError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.mined.get(transaction_hash).cloned())
    }
}
