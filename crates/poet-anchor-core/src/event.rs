//! Queue topics and the tagged events that travel on them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chain::{AnchorTransaction, ChainStateSnapshot};
use crate::error::CoreError;

/// A work topic. Each topic has its own FIFO and its own worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    BlockDownloaded,
    BlocksToSend,
    BlockRetry,
    ChainBlockObserved,
    ConfirmRetry,
}

impl Topic {
    /// Every topic, in a fixed order.
    pub const ALL: [Topic; 5] = [
        Topic::BlockDownloaded,
        Topic::BlocksToSend,
        Topic::BlockRetry,
        Topic::ChainBlockObserved,
        Topic::ConfirmRetry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::BlockDownloaded => "block_downloaded",
            Topic::BlocksToSend => "blocks_to_send",
            Topic::BlockRetry => "block_retry",
            Topic::ChainBlockObserved => "chain_block_observed",
            Topic::ConfirmRetry => "confirm_retry",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::decode(format!("unknown topic {s:?}")))
    }
}

/// A unit of work. Block payloads stay as raw canonical bytes so that
/// decoding failures surface inside the processor, where they are retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// A block fetched from a peer.
    BlockDownloaded { raw: Bytes, attempt: u32 },

    /// A locally created block waiting to be anchored.
    BlocksToSend { raw: Bytes, attempt: u32 },

    /// A block whose processing failed earlier.
    BlockRetry { raw: Bytes, attempt: u32 },

    /// A new chain state to scan for anchors.
    ChainBlockObserved { snapshot: ChainStateSnapshot },

    /// An anchor whose confirmation failed earlier.
    ConfirmRetry { anchor: AnchorTransaction, attempt: u32 },
}

impl QueueEvent {
    /// The topic this event is dispatched on.
    pub fn topic(&self) -> Topic {
        match self {
            QueueEvent::BlockDownloaded { .. } => Topic::BlockDownloaded,
            QueueEvent::BlocksToSend { .. } => Topic::BlocksToSend,
            QueueEvent::BlockRetry { .. } => Topic::BlockRetry,
            QueueEvent::ChainBlockObserved { .. } => Topic::ChainBlockObserved,
            QueueEvent::ConfirmRetry { .. } => Topic::ConfirmRetry,
        }
    }

    /// Serialize for durable storage.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::decode(e.to_string()))?;
        Ok(buf)
    }

    /// Inverse of [`QueueEvent::to_cbor`].
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::decode(e.to_string()))
    }
}
