//! Cryptographic primitives for Poet Anchor.
//!
//! Wraps Ed25519 signing and Blake3 hashing with strong types.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Fixed-size byte wrappers with hex helpers and a short `Debug` form.
macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:literal, $label:literal) => {
        $(#[$meta])*
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex; the decoded length must be exact.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                <[u8; $len]>::try_from(bytes.as_slice())
                    .map(Self)
                    .map_err(|_| hex::FromHexError::InvalidStringLength)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({}..)"), &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }
    };
}

fixed_bytes!(
    /// BLAKE3-256 digest.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    Blake3Hash, 32, "Blake3"
);

fixed_bytes!(
    /// Ed25519 verifying key.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    Ed25519PublicKey, 32, "Ed25519Pub"
);

fixed_bytes!(
    /// Ed25519 signature.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    Ed25519Signature, 64, "Ed25519Sig"
);

impl Blake3Hash {
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }
}

impl Ed25519PublicKey {
    /// Check `signature` over `digest`. Keys off the curve are an error, not
    /// a panic.
    pub fn verify(&self, digest: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify(digest, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl Ed25519Signature {
    /// All zeroes. Never verifies; claims carry it while their id is hashed.
    pub const ZERO: Self = Self([0u8; 64]);
}

/// Signing half of a claim author's identity.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic keypair; used by fixtures and golden vectors.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a digest, normally a claim id.
    pub fn sign(&self, digest: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(digest).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// Verify a signature given as raw byte slices.
///
/// Wrong key or signature lengths and keys that are not valid curve points
/// all yield `false`; this never panics on caller input.
pub fn verify(public_key: &[u8], digest: &[u8], signature: &[u8]) -> bool {
    let Ok(pk) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(sig) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    Ed25519PublicKey(pk)
        .verify(digest, &Ed25519Signature(sig))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let digest = Blake3Hash::hash(b"hello world");
        let signature = keypair.sign(digest.as_bytes());

        keypair
            .public_key()
            .verify(digest.as_bytes(), &signature)
            .expect("valid signature should verify");

        let tampered = Blake3Hash::hash(b"hello worlD");
        assert!(keypair.public_key().verify(tampered.as_bytes(), &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let seed = [0x42u8; 32];
        let kp1 = Keypair::from_seed(&seed);
        let kp2 = Keypair::from_seed(&seed);
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_verify_flipped_signature_byte_fails() {
        let keypair = Keypair::from_seed(&[0x07; 32]);
        let digest = [0x11u8; 32];
        let signature = keypair.sign(&digest);
        let pk = keypair.public_key();

        assert!(verify(pk.as_bytes(), &digest, signature.as_bytes()));

        for i in 0..64 {
            let mut bad = *signature.as_bytes();
            bad[i] ^= 0x01;
            assert!(!verify(pk.as_bytes(), &digest, &bad), "flipped byte {} verified", i);
        }
    }

    #[test]
    fn test_verify_bad_lengths() {
        let keypair = Keypair::from_seed(&[0x07; 32]);
        let digest = [0x11u8; 32];
        let signature = keypair.sign(&digest);

        assert!(!verify(&[0u8; 31], &digest, signature.as_bytes()));
        assert!(!verify(keypair.public_key().as_bytes(), &digest, &[0u8; 63]));
        assert!(!verify(&[], &digest, &[]));
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let keypair = Keypair::generate();
        let sig = keypair.sign(b"digest");
        let recovered = Ed25519Signature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(sig, recovered);
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let keypair = Keypair::generate();
        let pk = keypair.public_key();
        let recovered = Ed25519PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, recovered);
    }
}
