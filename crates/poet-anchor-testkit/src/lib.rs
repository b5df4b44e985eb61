//! # Poet Anchor Testkit
//!
//! Testing utilities for Poet Anchor.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known claims with expected ids, signatures and bytes
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Signers that make claims and blocks, and a chain builder
//!   that makes snapshots with forks
//! - **Mock chain**: A scriptable [`ChainClient`](poet_anchor_sync::ChainClient)
//!
//! ## Golden Vectors
//!
//! ```rust
//! use poet_anchor_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, id) in verify_all_vectors() {
//!     assert!(matches, "{name}: {id}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use poet_anchor_testkit::generators::{claim_from_params, ClaimParams};
//!
//! proptest! {
//!     #[test]
//!     fn claim_id_is_deterministic(params: ClaimParams) {
//!         let c1 = claim_from_params(&params);
//!         let c2 = claim_from_params(&params);
//!         prop_assert_eq!(c1.id, c2.id);
//!     }
//! }
//! ```
//!
//! ## Chain Fixtures
//!
//! ```rust
//! use poet_anchor_testkit::fixtures::{ChainFixture, TestFixture};
//!
//! let fixture = TestFixture::new();
//! let block = fixture.make_block("poems", 2);
//!
//! let mut chain = ChainFixture::new(100);
//! chain.extend();
//! chain.anchor(&block.id);
//! let snapshot = chain.snapshot();
//! assert_eq!(snapshot.height, 101);
//! ```

pub mod chain;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use chain::{broadcast_hash, MockChainClient};
pub use fixtures::{multi_party_fixtures, ChainFixture, TestFixture};
pub use generators::{claim_from_params, ClaimParams};
pub use vectors::{all_vectors, generate_claim_from_vector, verify_all_vectors, GoldenVector};
