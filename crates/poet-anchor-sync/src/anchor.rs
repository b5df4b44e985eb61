//! Building and broadcasting anchor transactions.

use std::sync::Arc;

use bytes::Bytes;

use poet_anchor_core::{build_anchor_payload, BlockId, TransactionHash};

use crate::client::{ChainClient, UnsignedTransaction};
use crate::error::{AnchorError, ChainClientError};

/// Turns block ids into broadcast chain transactions.
///
/// The builder never retries; a failed attempt is redriven by the caller,
/// which builds a fresh transaction with fresh inputs.
pub struct AnchorBuilder<C: ChainClient> {
    client: Arc<C>,
}

impl<C: ChainClient> AnchorBuilder<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Spend every output of `anchor_address` into a transaction that carries
    /// `payload` as a data output and returns the change to the same address.
    pub async fn create_transaction(
        &self,
        anchor_address: &str,
        payload: &[u8],
    ) -> Result<UnsignedTransaction, AnchorError> {
        let inputs = self.client.get_unspent_outputs(anchor_address).await?;
        if inputs.is_empty() {
            return Err(AnchorError::InsufficientFunds {
                address: anchor_address.to_string(),
            });
        }

        let change_value = inputs
            .iter()
            .try_fold(0u64, |total, u| total.checked_add(u.value))
            .ok_or_else(|| AnchorError::ValueOverflow {
                address: anchor_address.to_string(),
            })?;
        Ok(UnsignedTransaction {
            inputs,
            data: Bytes::copy_from_slice(payload),
            change_address: anchor_address.to_string(),
            change_value,
        })
    }

    /// Hand the transaction to the chain node.
    pub async fn broadcast(&self, tx: &UnsignedTransaction) -> Result<TransactionHash, AnchorError> {
        self.client.broadcast(tx).await.map_err(|e| match e {
            ChainClientError::Rejected(reason) => AnchorError::Broadcast(reason),
            other => AnchorError::Broadcast(other.to_string()),
        })
    }

    /// Build, broadcast and return the hash of the anchor for `block_id`.
    pub async fn anchor_block(
        &self,
        anchor_address: &str,
        block_id: &BlockId,
    ) -> Result<TransactionHash, AnchorError> {
        let payload = build_anchor_payload(block_id);
        let tx = self.create_transaction(anchor_address, &payload).await?;
        let hash = self.broadcast(&tx).await?;
        tracing::info!(block_id = %block_id, tx = %hash, inputs = tx.inputs.len(), "anchor broadcast");
        Ok(hash)
    }
}
