//! Claim and block validation, plus the relay signature checks.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::canonical::content_hash;
use crate::claim::Claim;
use crate::crypto;
use crate::error::ValidationError;

/// Validate a single claim.
///
/// This performs:
/// - Type presence check
/// - Id recomputation
/// - Signature verification over the id
pub fn validate_claim(claim: &Claim) -> Result<(), ValidationError> {
    if claim.claim_type.is_empty() {
        return Err(ValidationError::EmptyClaimType);
    }

    let computed = claim.compute_id();
    if computed != claim.id {
        return Err(ValidationError::ClaimIdMismatch {
            declared: claim.id,
            computed,
        });
    }

    claim
        .public_key
        .verify(claim.id.as_bytes(), &claim.signature)
        .map_err(|_| ValidationError::SignatureFailed(claim.id))
}

/// Validate a block: id recomputation, then every claim in order.
pub fn validate_block(block: &Block) -> Result<(), ValidationError> {
    let computed = block.compute_id();
    if computed != block.id {
        return Err(ValidationError::BlockIdMismatch {
            declared: block.id,
            computed,
        });
    }

    if block.is_empty() {
        return Err(ValidationError::EmptyBlock(block.id));
    }

    block.claims.iter().try_for_each(validate_claim)
}

/// A signature returned through the signing relay. All fields are hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub signature: String,
    pub public_key: String,
    pub message: String,
}

/// Check one relay signature against the hex-encoded message it answers.
///
/// The signed digest is the content hash of the decoded message bytes.
pub fn valid_signature(message: &str, signature: &Signature) -> bool {
    if message.is_empty() || signature.signature.is_empty() || signature.public_key.is_empty() {
        return false;
    }
    let (Ok(encoded), Ok(sig), Ok(pk)) = (
        hex::decode(message),
        hex::decode(&signature.signature),
        hex::decode(&signature.public_key),
    ) else {
        return false;
    };
    crypto::verify(&pk, content_hash(&encoded).as_bytes(), &sig)
}

/// Check a batch of relay signatures element-wise.
///
/// Valid only if the counts match and every element verifies; there is no
/// partial acceptance.
pub fn valid_signatures<M: AsRef<str>>(messages: &[M], signatures: &[Signature]) -> bool {
    messages.len() == signatures.len()
        && messages
            .iter()
            .zip(signatures)
            .all(|(m, s)| valid_signature(m.as_ref(), s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimBuilder;
    use crate::crypto::{Ed25519Signature, Keypair};
    use crate::types::ClaimId;

    fn make_test_keypair() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    fn relay_signature(keypair: &Keypair, message_hex: &str) -> Signature {
        let bytes = hex::decode(message_hex).unwrap();
        let sig = keypair.sign(content_hash(&bytes).as_bytes());
        Signature {
            signature: sig.to_hex(),
            public_key: keypair.public_key().to_hex(),
            message: message_hex.to_string(),
        }
    }

    #[test]
    fn test_valid_claim() {
        let claim = ClaimBuilder::new("Work").attribute("name", "x").sign(&make_test_keypair());
        assert!(validate_claim(&claim).is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let mut claim = ClaimBuilder::new("Work").attribute("name", "x").sign(&make_test_keypair());
        claim.signature.0[0] ^= 0xff;
        assert!(matches!(validate_claim(&claim), Err(ValidationError::SignatureFailed(_))));
    }

    #[test]
    fn test_claim_id_mismatch() {
        let mut claim = ClaimBuilder::new("Work").attribute("name", "x").sign(&make_test_keypair());
        claim.id = ClaimId::from_bytes([0x01; 32]);
        assert!(matches!(validate_claim(&claim), Err(ValidationError::ClaimIdMismatch { .. })));
    }

    #[test]
    fn test_empty_claim_type() {
        let claim = ClaimBuilder::new("").sign(&make_test_keypair());
        assert!(matches!(validate_claim(&claim), Err(ValidationError::EmptyClaimType)));
    }

    #[test]
    fn test_block_with_bad_claim_rejected() {
        let keypair = make_test_keypair();
        let good = ClaimBuilder::new("Work").attribute("name", "a").sign(&keypair);
        let mut bad = ClaimBuilder::new("Work").attribute("name", "b").sign(&keypair);
        bad.signature = Ed25519Signature::ZERO;

        assert!(validate_block(&Block::new(vec![good.clone()])).is_ok());
        assert!(validate_block(&Block::new(vec![good, bad])).is_err());
    }

    #[test]
    fn test_block_id_mismatch() {
        let keypair = make_test_keypair();
        let mut block = Block::new(vec![ClaimBuilder::new("Work").sign(&keypair)]);
        block.claims.push(ClaimBuilder::new("Title").sign(&keypair));
        assert!(matches!(validate_block(&block), Err(ValidationError::BlockIdMismatch { .. })));
    }

    #[test]
    fn test_empty_block_rejected() {
        assert!(matches!(validate_block(&Block::new(vec![])), Err(ValidationError::EmptyBlock(_))));
    }

    #[test]
    fn test_relay_signature() {
        let keypair = make_test_keypair();
        let sig = relay_signature(&keypair, "deadbeef");
        assert!(valid_signature("deadbeef", &sig));
        assert!(!valid_signature("deadbeee", &sig));
        assert!(!valid_signature("not hex", &sig));
    }

    #[test]
    fn test_relay_signatures_batch_all_or_nothing() {
        let keypair = make_test_keypair();
        let messages = ["aa01", "bb02"];
        let good = relay_signature(&keypair, "aa01");
        let mut bad = relay_signature(&keypair, "bb02");
        bad.signature = Ed25519Signature::ZERO.to_hex();

        assert!(valid_signatures(&messages, &[good.clone(), relay_signature(&keypair, "bb02")]));
        assert!(!valid_signatures(&messages, &[good.clone(), bad]));
        assert!(!valid_signatures(&messages, &[good]));
    }

    #[test]
    fn test_relay_signature_json_shape() {
        let json = r#"{"signature":"00","publicKey":"11","message":"22"}"#;
        let sig: Signature = serde_json::from_str(json).unwrap();
        assert_eq!(sig.public_key, "11");
    }
}
