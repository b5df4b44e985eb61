//! # Poet Anchor Core
//!
//! Pure primitives for Poet Anchor: claims, blocks, canonical encoding, anchor
//! payloads and the chain data model.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Claim`] - A signed, content-addressed provenance record
//! - [`Block`] - An ordered batch of claims, anchored on-chain by [`BlockId`]
//! - [`ChainStateSnapshot`] - The chain tip, recent ancestry and observed anchors
//! - [`QueueEvent`] - Tagged unit of work for the processing pipeline
//!
//! ## Canonicalization
//!
//! Claims and blocks are encoded using deterministic CBOR. See [`canonical`].

pub mod anchor;
pub mod block;
pub mod canonical;
pub mod chain;
pub mod claim;
pub mod crypto;
pub mod error;
pub mod event;
pub mod types;
pub mod verify;

pub use anchor::{build_anchor_payload, parse_anchor_payload, ANCHOR_MAGIC, ANCHOR_PAYLOAD_LEN, ANCHOR_VERSION};
pub use block::Block;
pub use canonical::{
    content_hash, decode_block, decode_claim, encode_block, encode_block_preimage, encode_claim,
    encode_claim_preimage,
};
pub use chain::{AnchorTransaction, BlockStatus, ChainAnchorRecord, ChainBlockHeader, ChainStateSnapshot};
pub use claim::{Claim, ClaimBuilder};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use event::{QueueEvent, Topic};
pub use types::{BlockId, ChainBlockHash, ClaimId, TransactionHash};
pub use verify::{valid_signature, valid_signatures, validate_block, validate_claim, Signature};
