//! # Poet Anchor Sync
//!
//! Moves blocks through their lifecycle and keeps confirmation state in line
//! with the chain.
//!
//! ## Components
//!
//! - [`BlockProcessor`] - Handles queue events; the only writer of block state
//! - [`ReorgDetector`] - Diffs consecutive chain snapshots
//! - [`AnchorBuilder`] - Builds and broadcasts anchor transactions
//! - [`ChainClient`] - The async seam to a chain node
//! - [`BlockLocks`] - Per-block mutual exclusion
//!
//! ## Lifecycle
//!
//! ```text
//! Unseen ──download──▶ Seen ──anchor mined──▶ Confirmed
//!                       │  ▲                      │
//!              failure  ▼  │ redrive              │ reorg
//!                   RetryPending          Seen ◀──┘
//! ```

pub mod anchor;
pub mod client;
pub mod error;
pub mod locks;
pub mod processor;
pub mod reorg;

pub use anchor::AnchorBuilder;
pub use client::{ChainClient, UnsignedTransaction, Utxo};
pub use error::{AnchorError, ChainClientError, Result, SyncError};
pub use locks::{BlockGuard, BlockLocks};
pub use processor::{
    Alert, AlertSink, BlockProcessor, Handled, ProcessorConfig, ProcessorStats, StatsSnapshot,
    TracingAlertSink,
};
pub use reorg::{ReorgConfig, ReorgDelta, ReorgDetector};
