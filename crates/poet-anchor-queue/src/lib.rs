//! # Poet Anchor Queue
//!
//! Per-topic work queues with at-least-once delivery, plus the progress
//! channel that announces processed chain heights.
//!
//! ## Key Types
//!
//! - [`Queue`] - The async trait every backend implements
//! - [`MemoryQueue`] - Process-local queue
//! - [`SqliteQueue`] - Durable queue; in-flight items survive a restart
//! - [`ProgressAnnouncer`] - `bitcoin_block_processed(height)` announcements

pub mod error;
pub mod memory;
pub mod progress;
pub mod sqlite;
pub mod traits;

pub use error::{QueueError, Result};
pub use memory::MemoryQueue;
pub use progress::ProgressAnnouncer;
pub use sqlite::SqliteQueue;
pub use traits::{Delivery, DeliveryId, Queue, QueueConfig};
