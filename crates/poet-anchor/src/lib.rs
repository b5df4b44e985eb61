//! # Poet Anchor
//!
//! Provenance claims, batched into blocks and anchored on a public chain.
//!
//! ## Overview
//!
//! A node:
//!
//! - **Batches claims**: signed, content-addressed records become blocks
//! - **Anchors blocks**: a small data output carries the block id on-chain
//! - **Tracks confirmation**: mined anchors move blocks to `Confirmed`
//! - **Survives reorgs**: anchors on abandoned branches are retracted
//!
//! Work flows through per-topic queues; one worker per topic feeds the
//! block processor, which is the only writer of block state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use poet_anchor::{Node, NodeConfig};
//! use poet_anchor::core::{ClaimBuilder, Keypair};
//! use poet_anchor::queue::SqliteQueue;
//! use poet_anchor::store::SqliteStore;
//!
//! async fn example(client: impl poet_anchor::sync::ChainClient + 'static) {
//!     let config = NodeConfig::load("node.json").unwrap();
//!     let store = SqliteStore::open("anchor.db").unwrap();
//!     let queue = SqliteQueue::open("queue.db", config.queue()).unwrap();
//!
//!     let node = Node::new(store, queue, client, config);
//!     node.start().await.unwrap();
//!
//!     let keypair = Keypair::generate();
//!     let claim = ClaimBuilder::new("Work")
//!         .attribute("name", "The Raven")
//!         .sign(&keypair);
//!     let block_id = node.publish_claims(vec![claim]).await.unwrap();
//!
//!     node.shutdown().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `poet_anchor::core` - Claims, blocks, codec, chain model
//! - `poet_anchor::store` - Storage abstraction and SQLite
//! - `poet_anchor::queue` - Work queues and progress announcements
//! - `poet_anchor::sync` - Block processor, reorg detection, anchoring

pub mod config;
pub mod error;
pub mod node;
pub mod relay;

// Re-export component crates
pub use poet_anchor_core as core;
pub use poet_anchor_queue as queue;
pub use poet_anchor_store as store;
pub use poet_anchor_sync as sync;

// Re-export main types for convenience
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use node::Node;
pub use relay::{RequestId, SignRequest, SignRequests, SignResponse};

// Re-export commonly used core types
pub use poet_anchor_core::{
    Block, BlockId, BlockStatus, ChainAnchorRecord, Claim, ClaimBuilder, ClaimId, Keypair,
    Signature,
};
