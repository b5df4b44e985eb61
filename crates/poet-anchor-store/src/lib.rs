//! # Poet Anchor Store
//!
//! Storage abstraction for Poet Anchor. Provides a trait-based interface for
//! blocks, claims, anchor records and the sync checkpoint, with SQLite and
//! in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of saving a block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use poet_anchor_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("anchor.db").unwrap();
//!     let height = store.get_last_processed_height().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent saves**: Saving the same block twice returns `AlreadyExists`
//! - **Atomic transitions**: confirmation writes the record and status together
//! - **Monotonic checkpoint**: the processed height only moves forward

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};
