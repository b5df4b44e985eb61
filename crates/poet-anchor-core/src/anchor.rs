//! On-chain anchor payload: `magic ‖ version ‖ block id`.

use crate::error::CoreError;
use crate::types::BlockId;

/// Four ASCII bytes identifying our anchors among other data carriers.
pub const ANCHOR_MAGIC: &[u8; 4] = b"BARD";

/// Current payload version, big-endian on the wire.
pub const ANCHOR_VERSION: u32 = 1;

/// Total payload length: 4 magic + 4 version + 32 id.
pub const ANCHOR_PAYLOAD_LEN: usize = 40;

/// Build the data-carrier payload for a block id.
pub fn build_anchor_payload(block_id: &BlockId) -> [u8; ANCHOR_PAYLOAD_LEN] {
    let mut out = [0u8; ANCHOR_PAYLOAD_LEN];
    out[..4].copy_from_slice(ANCHOR_MAGIC);
    out[4..8].copy_from_slice(&ANCHOR_VERSION.to_be_bytes());
    out[8..].copy_from_slice(block_id.as_bytes());
    out
}

/// Parse a data-carrier payload.
///
/// Returns `Ok(None)` for foreign payloads (different magic). A payload with
/// our magic but a wrong version or length is an error.
pub fn parse_anchor_payload(payload: &[u8]) -> Result<Option<BlockId>, CoreError> {
    if payload.len() < ANCHOR_MAGIC.len() || &payload[..4] != ANCHOR_MAGIC {
        return Ok(None);
    }
    if payload.len() < 8 {
        return Err(CoreError::decode("anchor payload truncated before version"));
    }
    let version = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    if version != ANCHOR_VERSION {
        return Err(CoreError::decode(format!("unsupported anchor payload version {version}")));
    }
    if payload.len() != ANCHOR_PAYLOAD_LEN {
        return Err(CoreError::decode(format!(
            "anchor payload length {}, expected {}",
            payload.len(),
            ANCHOR_PAYLOAD_LEN
        )));
    }
    BlockId::try_from(&payload[8..])
        .map(Some)
        .map_err(|_| CoreError::decode("anchor payload id"))
}
