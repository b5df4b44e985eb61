//! Claims: signed, content-addressed provenance records.
//!
//! A claim is immutable. Its id is the hash of its canonical pre-image, and
//! its signature covers that id, so any change to the type or attributes
//! produces a different claim.

use std::collections::BTreeMap;

use crate::canonical::{content_hash, encode_claim_preimage};
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::types::ClaimId;

/// Claim type discriminators in common use.
pub mod claim_type {
    pub const WORK: &str = "Work";
    pub const PROFILE: &str = "Profile";
    pub const LICENSE: &str = "License";
    pub const TITLE: &str = "Title";
}

/// A signed claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Hash of the canonical pre-image.
    pub id: ClaimId,

    /// The signer's public key.
    pub public_key: Ed25519PublicKey,

    /// Ed25519 signature over the id bytes.
    pub signature: Ed25519Signature,

    /// Discriminator such as "Work" or "License".
    pub claim_type: String,

    /// Attributes, ordered by key.
    pub attributes: BTreeMap<String, String>,
}

impl Claim {
    /// Recompute the id from public key, type and attributes.
    pub fn compute_id(&self) -> ClaimId {
        ClaimId(content_hash(&encode_claim_preimage(self)).0)
    }

    /// Look up an attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Builder for creating signed claims.
pub struct ClaimBuilder {
    claim_type: String,
    attributes: BTreeMap<String, String>,
}

impl ClaimBuilder {
    /// Start building a claim of the given type.
    pub fn new(claim_type: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute. A repeated key replaces the earlier value.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set several attributes at once.
    pub fn attributes<K, V>(mut self, attrs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attrs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Compute the id and sign it.
    pub fn sign(self, keypair: &Keypair) -> Claim {
        let mut claim = Claim {
            id: ClaimId::ZERO,
            public_key: keypair.public_key(),
            signature: Ed25519Signature::ZERO,
            claim_type: self.claim_type,
            attributes: self.attributes,
        };
        claim.id = claim.compute_id();
        claim.signature = keypair.sign(claim.id.as_bytes());
        claim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_builder() {
        let keypair = Keypair::generate();
        let claim = ClaimBuilder::new(claim_type::WORK)
            .attribute("name", "Annabel Lee")
            .attribute("author", "Edgar Allan Poe")
            .sign(&keypair);

        assert_eq!(claim.claim_type, "Work");
        assert_eq!(claim.attribute("name"), Some("Annabel Lee"));
        assert_eq!(claim.public_key, keypair.public_key());
        assert_eq!(claim.id, claim.compute_id());
        assert!(claim.public_key.verify(claim.id.as_bytes(), &claim.signature).is_ok());
    }

    #[test]
    fn test_attribute_insertion_order_does_not_change_id() {
        let keypair = Keypair::from_seed(&[0x42; 32]);

        let a = ClaimBuilder::new("Work")
            .attribute("name", "Ulalume")
            .attribute("author", "Poe")
            .attribute("dateCreated", "1847")
            .sign(&keypair);

        let b = ClaimBuilder::new("Work")
            .attribute("dateCreated", "1847")
            .attribute("name", "Ulalume")
            .attribute("author", "Poe")
            .sign(&keypair);

        assert_eq!(a.id, b.id);
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn test_id_independent_of_signer_randomness() {
        let keypair = Keypair::from_seed(&[0x01; 32]);
        let claim = ClaimBuilder::new("Profile").attribute("displayName", "E. A. P.").sign(&keypair);

        let mut resigned = claim.clone();
        resigned.signature = Ed25519Signature::ZERO;
        assert_eq!(resigned.compute_id(), claim.id);
    }

    #[test]
    fn test_any_change_yields_new_id() {
        let keypair = Keypair::from_seed(&[0x01; 32]);
        let claim = ClaimBuilder::new("Work").attribute("name", "Eldorado").sign(&keypair);

        let mut changed = claim.clone();
        changed.attributes.insert("name".into(), "Eldorado!".into());
        assert_ne!(changed.compute_id(), claim.id);

        let mut retyped = claim.clone();
        retyped.claim_type = "License".into();
        assert_ne!(retyped.compute_id(), claim.id);
    }
}
