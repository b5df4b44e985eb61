//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;

use poet_anchor_core::claim::claim_type;
use poet_anchor_core::{Block, BlockId, Claim, ClaimBuilder, Keypair};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random BlockId.
pub fn block_id() -> impl Strategy<Value = BlockId> {
    any::<[u8; 32]>().prop_map(BlockId::from_bytes)
}

/// Generate a claim type, mostly the well-known ones.
pub fn claim_type_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(claim_type::WORK.to_string()),
        Just(claim_type::PROFILE.to_string()),
        Just(claim_type::LICENSE.to_string()),
        Just(claim_type::TITLE.to_string()),
        "[A-Z][a-zA-Z]{1,15}".prop_map(String::from),
    ]
}

/// Generate attribute pairs in arbitrary order; keys may repeat.
pub fn attribute_pairs(max_len: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z][a-zA-Z0-9]{0,11}", "\\PC{0,40}"), 0..=max_len)
}

/// Parameters for generating a claim.
#[derive(Debug, Clone)]
pub struct ClaimParams {
    pub keypair: Keypair,
    pub claim_type: String,
    pub attributes: Vec<(String, String)>,
}

impl Arbitrary for ClaimParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), claim_type_name(), attribute_pairs(8))
            .prop_map(|(seed, claim_type, attributes)| ClaimParams {
                keypair: Keypair::from_seed(&seed),
                claim_type,
                attributes,
            })
            .boxed()
    }
}

/// Generate a signed claim from parameters.
pub fn claim_from_params(params: &ClaimParams) -> Claim {
    ClaimBuilder::new(params.claim_type.clone())
        .attributes(params.attributes.iter().cloned())
        .sign(&params.keypair)
}

/// Generate a signed claim.
pub fn claim() -> impl Strategy<Value = Claim> {
    any::<ClaimParams>().prop_map(|p| claim_from_params(&p))
}

/// Generate a non-empty block.
pub fn block(max_claims: usize) -> impl Strategy<Value = Block> {
    prop::collection::vec(claim(), 1..=max_claims.max(1)).prop_map(Block::new)
}

/// The last value written for each key, which is what a claim keeps.
pub fn effective_attributes(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    pairs.iter().cloned().collect()
}
