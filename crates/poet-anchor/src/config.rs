//! Node configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes. Durations are written in milliseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use poet_anchor_queue::QueueConfig;
use poet_anchor_sync::{ProcessorConfig, ReorgConfig};

use crate::error::{NodeError, Result};

/// Configuration for a [`Node`](crate::Node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// Address that funds anchor transactions.
    pub anchor_address: String,

    /// Redrives allowed for a permanently failing work item.
    pub max_retry_attempts: u32,

    /// Headers searched for a common ancestor when the chain changes.
    pub lookback_window: usize,

    /// Maximum number of queued items.
    pub queue_capacity: usize,

    /// How often a durable queue re-checks storage while idle.
    #[serde(rename = "queuePollIntervalMs", with = "millis")]
    pub queue_poll_interval: Duration,

    /// How often the chain is polled for a new snapshot.
    #[serde(rename = "chainPollIntervalMs", with = "millis")]
    pub chain_poll_interval: Duration,

    /// Pause after a failed or redriven work item.
    #[serde(rename = "loopBackoffMs", with = "millis")]
    pub loop_backoff: Duration,

    /// How long shutdown waits for in-flight items.
    #[serde(rename = "shutdownGraceMs", with = "millis")]
    pub shutdown_grace: Duration,

    /// How long an unanswered sign request is kept.
    #[serde(rename = "signRequestTtlMs", with = "millis")]
    pub sign_request_ttl: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let processor = ProcessorConfig::default();
        let queue = QueueConfig::default();
        Self {
            anchor_address: processor.anchor_address,
            max_retry_attempts: processor.max_retry_attempts,
            lookback_window: ReorgConfig::default().lookback_window,
            queue_capacity: queue.capacity,
            queue_poll_interval: queue.poll_interval,
            chain_poll_interval: Duration::from_secs(30),
            loop_backoff: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(10),
            sign_request_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl NodeConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Read and parse a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn processor(&self) -> ProcessorConfig {
        ProcessorConfig {
            max_retry_attempts: self.max_retry_attempts,
            anchor_address: self.anchor_address.clone(),
        }
    }

    pub fn reorg(&self) -> ReorgConfig {
        ReorgConfig {
            lookback_window: self.lookback_window,
        }
    }

    pub fn queue(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            poll_interval: self.queue_poll_interval,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
