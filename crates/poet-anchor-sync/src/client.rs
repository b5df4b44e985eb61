//! Chain client abstraction.
//!
//! The processor never talks to a chain node directly. Everything it needs
//! (spendable outputs, broadcasting, chain state) goes through this trait, so
//! the node RPC, an indexer or a test double can be plugged in.

use async_trait::async_trait;
use bytes::Bytes;

use poet_anchor_core::{AnchorTransaction, ChainStateSnapshot, TransactionHash};

use crate::error::ChainClientError;

/// A spendable output owned by the anchor address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub transaction_hash: TransactionHash,
    pub output_index: u32,
    /// Value in the chain's smallest unit.
    pub value: u64,
}

/// An anchor transaction ready to be signed and broadcast by the client.
///
/// Fee selection and signing belong to the client; `change_value` is the
/// total input value before fees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub inputs: Vec<Utxo>,
    /// Non-spendable data output.
    pub data: Bytes,
    pub change_address: String,
    pub change_value: u64,
}

/// Async interface to a chain node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Unspent outputs currently owned by `address`.
    async fn get_unspent_outputs(&self, address: &str) -> Result<Vec<Utxo>, ChainClientError>;

    /// Sign and broadcast a transaction. Returns its hash.
    async fn broadcast(&self, tx: &UnsignedTransaction) -> Result<TransactionHash, ChainClientError>;

    /// The current tip, recent ancestry and the anchor transactions in it.
    async fn get_chain_state_snapshot(&self) -> Result<ChainStateSnapshot, ChainClientError>;

    /// Where a broadcast transaction was mined, if it was.
    async fn get_block_info_by_anchor_hash(
        &self,
        transaction_hash: &TransactionHash,
    ) -> Result<Option<AnchorTransaction>, ChainClientError>;
}
