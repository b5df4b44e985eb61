//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical encoding, the claim and block ids and
//! the Ed25519 signatures, so any other implementation can check itself
//! byte for byte.

use poet_anchor_core::{build_anchor_payload, encode_claim, Block, BlockId, Claim, ClaimBuilder, Keypair};

/// A golden claim vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for deterministic key generation.
    pub seed: [u8; 32],
    pub claim_type: &'static str,
    pub attributes: &'static [(&'static str, &'static str)],
    /// Expected public key (hex).
    pub expected_public_key: &'static str,
    /// Expected claim id (hex).
    pub expected_claim_id: &'static str,
    /// Expected signature over the id (hex).
    pub expected_signature: &'static str,
    /// Expected canonical encoding (hex).
    pub expected_bytes: &'static str,
}

/// Get all golden claim vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "Work claim with two attributes",
            seed: [0x42; 32],
            claim_type: "Work",
            attributes: &[("name", "The Raven"), ("author", "Edgar Allan Poe")],
            expected_public_key: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_claim_id: "34e09b05ee3e832259e89d00b3a2a1f7b92202efbd841b28fcdd8124710e903e",
            expected_signature: "541a22589523fec40cad398d7b4c2415861676aac782f4ae9c347f7e2b760c40\
                                 46cbdcf033d9a74289e275ac11aac4705076f35cfec2cd220906d3d54eaf7b0a",
            expected_bytes: "a500582034e09b05ee3e832259e89d00b3a2a1f7b92202efbd841b28fcdd8124710e903e\
                             0158202152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12\
                             025840541a22589523fec40cad398d7b4c2415861676aac782f4ae9c347f7e2b760c40\
                             46cbdcf033d9a74289e275ac11aac4705076f35cfec2cd220906d3d54eaf7b0a\
                             0364576f726b\
                             048282\
                             66617574686f726f456467617220416c6c616e20506f65\
                             82646e616d656954686520526176656e",
        },
        GoldenVector {
            name: "Profile claim without attributes",
            seed: [0x00; 32],
            claim_type: "Profile",
            attributes: &[],
            expected_public_key: "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29",
            expected_claim_id: "38a6bb060063a318dc414e27ee9c614cbf0a197882e08035a5d9e332683c7d4a",
            expected_signature: "d6d2cec4070e636557bb58648e927ecb8fe4dcd9933272e5dbcaa40fabc02567\
                                 c50cbb16095c055cf5708f4f9932d154b4b6cbe1f91637d11cec1ed627e5050a",
            expected_bytes: "a500582038a6bb060063a318dc414e27ee9c614cbf0a197882e08035a5d9e332683c7d4a\
                             0158203b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29\
                             025840d6d2cec4070e636557bb58648e927ecb8fe4dcd9933272e5dbcaa40fabc02567\
                             c50cbb16095c055cf5708f4f9932d154b4b6cbe1f91637d11cec1ed627e5050a\
                             036750726f66696c65\
                             0480",
        },
        GoldenVector {
            name: "License claim, attributes given out of order",
            seed: [0x07; 32],
            claim_type: "License",
            attributes: &[("reference", "ab"), ("licenseType", "cc-by")],
            expected_public_key: "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
            expected_claim_id: "27d30f32d5cf2b377663403bb76dd8cc7ebf8c0c1a79ccd0c11dbfbf2d94cdc3",
            expected_signature: "9dc7ed634631e1b8a702f3ccd4d92449585c96c03d8eb3b589beb803b3b47ae2\
                                 8ee14f29c5d808a1fe5e75ff62fed1959c655da8149c10a91f52aad458dd850b",
            expected_bytes: "a500582027d30f32d5cf2b377663403bb76dd8cc7ebf8c0c1a79ccd0c11dbfbf2d94cdc3\
                             015820ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c\
                             0258409dc7ed634631e1b8a702f3ccd4d92449585c96c03d8eb3b589beb803b3b47ae2\
                             8ee14f29c5d808a1fe5e75ff62fed1959c655da8149c10a91f52aad458dd850b\
                             03674c6963656e7365\
                             0482\
                             826b6c6963656e7365547970656563632d6279\
                             82697265666572656e6365626162",
        },
    ]
}

/// Expected id of a block holding every vector's claim, in vector order.
pub const ALL_VECTORS_BLOCK_ID: &str =
    "a8edd3ee5d5edadb49cbff78de6ada8223150e9455d3df8f49df6e7a5533fe45";

/// Expected id of a block holding only the first vector's claim.
pub const FIRST_VECTOR_BLOCK_ID: &str =
    "30effb2be48b467b9842b38ff0396ae461c2e12f5ab907d23dc3d64ec601fe6b";

/// Expected anchor payload for a block id of 32 `0x11` bytes.
pub const ANCHOR_PAYLOAD_OF_ELEVENS: &str =
    "42415244000000011111111111111111111111111111111111111111111111111111111111111111";

/// Build the claim described by a vector.
pub fn generate_claim_from_vector(vector: &GoldenVector) -> Claim {
    ClaimBuilder::new(vector.claim_type)
        .attributes(vector.attributes.iter().copied())
        .sign(&Keypair::from_seed(&vector.seed))
}

/// The block holding every vector's claim, in vector order.
pub fn generate_block_from_vectors() -> Block {
    Block::new(all_vectors().iter().map(generate_claim_from_vector).collect())
}

/// Check every vector. Returns `(name, matches, computed id hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let claim = generate_claim_from_vector(v);
            let id = claim.id.to_hex();
            let matches = id == v.expected_claim_id
                && claim.public_key.to_hex() == v.expected_public_key
                && claim.signature.to_hex() == v.expected_signature
                && hex::encode(encode_claim(&claim)) == v.expected_bytes;
            (v.name.to_string(), matches, id)
        })
        .collect()
}

/// The anchor payload for `block_id`, hex encoded.
pub fn anchor_payload_hex(block_id: &BlockId) -> String {
    hex::encode(build_anchor_payload(block_id))
}
