//! Canonical CBOR encoding for claims and blocks.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Integer map keys, written in ascending order
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - Attributes as an array of `[key, value]` pairs sorted by key
//!
//! The same claim must produce identical bytes (and thus an identical id) on
//! every node, so decoding is strict: after parsing, the value is re-encoded
//! and must reproduce the input exactly.

use ciborium::value::Value;
use std::collections::BTreeMap;

use crate::block::Block;
use crate::claim::Claim;
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature};
use crate::error::CoreError;
use crate::types::{BlockId, ClaimId};

/// Claim map keys.
mod claim_keys {
    pub const ID: u64 = 0;
    pub const PUBLIC_KEY: u64 = 1;
    pub const SIGNATURE: u64 = 2;
    pub const TYPE: u64 = 3;
    pub const ATTRIBUTES: u64 = 4;
}

/// Block map keys.
mod block_keys {
    pub const ID: u64 = 0;
    pub const CLAIMS: u64 = 1;
}

/// Placeholder written for blanked fields in a pre-image.
const EMPTY: &[u8] = &[];

/// Hash applied to every encoded form.
pub fn content_hash(bytes: &[u8]) -> Blake3Hash {
    Blake3Hash::hash(bytes)
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode a claim with all fields.
pub fn encode_claim(claim: &Claim) -> Vec<u8> {
    let mut buf = Vec::with_capacity(160);
    write_claim(&mut buf, claim, false);
    buf
}

/// Encode the bytes a claim id is computed from: id and signature are
/// written as empty byte strings.
pub fn encode_claim_preimage(claim: &Claim) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    write_claim(&mut buf, claim, true);
    buf
}

/// Encode a block with its id and full claims.
pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut buf = Vec::new();
    write_block(&mut buf, block, false);
    buf
}

/// Encode the bytes a block id is computed from: the id is an empty byte
/// string, claims are written in full.
pub fn encode_block_preimage(block: &Block) -> Vec<u8> {
    let mut buf = Vec::new();
    write_block(&mut buf, block, true);
    buf
}

fn write_claim(buf: &mut Vec<u8>, claim: &Claim, preimage: bool) {
    encode_uint(buf, 5, 5);

    encode_uint(buf, 0, claim_keys::ID);
    encode_bytes(buf, if preimage { EMPTY } else { claim.id.as_bytes().as_slice() });

    encode_uint(buf, 0, claim_keys::PUBLIC_KEY);
    encode_bytes(buf, claim.public_key.as_bytes());

    encode_uint(buf, 0, claim_keys::SIGNATURE);
    encode_bytes(buf, if preimage { EMPTY } else { claim.signature.as_bytes().as_slice() });

    encode_uint(buf, 0, claim_keys::TYPE);
    encode_text(buf, &claim.claim_type);

    encode_uint(buf, 0, claim_keys::ATTRIBUTES);
    encode_uint(buf, 4, claim.attributes.len() as u64);
    for (key, value) in &claim.attributes {
        encode_uint(buf, 4, 2);
        encode_text(buf, key);
        encode_text(buf, value);
    }
}

fn write_block(buf: &mut Vec<u8>, block: &Block, preimage: bool) {
    encode_uint(buf, 5, 2);

    encode_uint(buf, 0, block_keys::ID);
    encode_bytes(buf, if preimage { EMPTY } else { block.id.as_bytes().as_slice() });

    encode_uint(buf, 0, block_keys::CLAIMS);
    encode_uint(buf, 4, block.claims.len() as u64);
    for claim in &block.claims {
        write_claim(buf, claim, false);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Decode a claim from canonical bytes.
pub fn decode_claim(bytes: &[u8]) -> Result<Claim, CoreError> {
    let value = read_value(bytes)?;
    let claim = claim_from_value(&value)?;
    if encode_claim(&claim) != bytes {
        return Err(CoreError::decode("claim is not canonically encoded"));
    }
    Ok(claim)
}

/// Decode a block from canonical bytes.
pub fn decode_block(bytes: &[u8]) -> Result<Block, CoreError> {
    let value = read_value(bytes)?;
    let block = block_from_value(&value)?;
    if encode_block(&block) != bytes {
        return Err(CoreError::decode("block is not canonically encoded"));
    }
    Ok(block)
}

fn read_value(bytes: &[u8]) -> Result<Value, CoreError> {
    if bytes.is_empty() {
        return Err(CoreError::decode("empty input"));
    }
    ciborium::from_reader(bytes).map_err(|e| CoreError::decode(e.to_string()))
}

/// Fetch the map entries and check every key is the expected integer in order.
fn keyed_entries<'a>(value: &'a Value, expected: &[u64], what: &str) -> Result<Vec<&'a Value>, CoreError> {
    let Value::Map(entries) = value else {
        return Err(CoreError::decode(format!("{what}: expected map")));
    };
    if entries.len() != expected.len() {
        return Err(CoreError::decode(format!(
            "{what}: expected {} fields, found {}",
            expected.len(),
            entries.len()
        )));
    }
    entries
        .iter()
        .zip(expected)
        .map(|((k, v), want)| match k {
            Value::Integer(i) if u64::try_from(*i).ok() == Some(*want) => Ok(v),
            _ => Err(CoreError::decode(format!("{what}: unexpected key, wanted {want}"))),
        })
        .collect()
}

fn fixed_bytes<const N: usize>(value: &Value, field: &str) -> Result<[u8; N], CoreError> {
    match value {
        Value::Bytes(b) => b
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::decode(format!("{field}: expected {N} bytes, found {}", b.len()))),
        _ => Err(CoreError::decode(format!("{field}: expected byte string"))),
    }
}

fn text<'a>(value: &'a Value, field: &str) -> Result<&'a str, CoreError> {
    match value {
        Value::Text(s) => Ok(s),
        _ => Err(CoreError::decode(format!("{field}: expected text"))),
    }
}

fn claim_from_value(value: &Value) -> Result<Claim, CoreError> {
    use claim_keys::*;
    let fields = keyed_entries(value, &[ID, PUBLIC_KEY, SIGNATURE, TYPE, ATTRIBUTES], "claim")?;

    let id = ClaimId(fixed_bytes::<32>(fields[0], "claim.id")?);
    let public_key = Ed25519PublicKey(fixed_bytes::<32>(fields[1], "claim.public_key")?);
    let signature = Ed25519Signature(fixed_bytes::<64>(fields[2], "claim.signature")?);
    let claim_type = text(fields[3], "claim.type")?.to_owned();

    let Value::Array(pairs) = fields[4] else {
        return Err(CoreError::decode("claim.attributes: expected array"));
    };
    let mut attributes = BTreeMap::new();
    for pair in pairs {
        match pair {
            Value::Array(kv) if kv.len() == 2 => {
                let key = text(&kv[0], "claim.attributes key")?;
                let val = text(&kv[1], "claim.attributes value")?;
                attributes.insert(key.to_owned(), val.to_owned());
            }
            _ => return Err(CoreError::decode("claim.attributes: expected [key, value] pair")),
        }
    }

    Ok(Claim {
        id,
        public_key,
        signature,
        claim_type,
        attributes,
    })
}

fn block_from_value(value: &Value) -> Result<Block, CoreError> {
    let fields = keyed_entries(value, &[block_keys::ID, block_keys::CLAIMS], "block")?;

    let id = BlockId(fixed_bytes::<32>(fields[0], "block.id")?);
    let Value::Array(items) = fields[1] else {
        return Err(CoreError::decode("block.claims: expected array"));
    };
    let claims = items.iter().map(claim_from_value).collect::<Result<Vec<_>, _>>()?;

    Ok(Block { id, claims })
}
