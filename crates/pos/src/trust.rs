//! Trust contribution of proof-of-stake blocks.

use ember_pow::difficulty::{block_proof, CompactError};
use primitive_types::U256;

/// Trust contribution of a proof-of-stake block: the inverse-target proof
/// scaled by the chain's stake trust weight.
///
/// The scaling keeps single-block PoS and PoW trust values numerically
/// distinct; the two regimes are only comparable through accumulated chain
/// trust.
pub fn pos_block_trust(bits: u32, stake_trust_weight: u32) -> Result<U256, CompactError> {
    Ok(block_proof(bits)?.saturating_mul(U256::from(stake_trust_weight)))
}
