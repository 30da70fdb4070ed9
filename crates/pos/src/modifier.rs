//! Rolling stake modifier and entropy bit.
//!
//! The modifier is a 64-bit value carried forward block to block and mixed
//! into every descendant's kernel hash, so its derivation must be
//! reproducible byte for byte by every validating node. Regeneration is
//! gated on the modifier interval: a block whose timestamp crosses an
//! interval boundary relative to its parent folds a fresh selection hash
//! into the chain, every other block carries the parent's modifier.

use ember_consensus::Hash256;
use ember_primitives::hash::sha256d;

/// Write-once stake fields stamped onto an index entry at score time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StakeModifier {
    pub modifier: u64,
    pub checksum: u32,
    pub generated: bool,
    pub entropy_bit: bool,
}

/// Single entropy bit folded from the block hash: the lowest bit of the
/// hash value (little-endian byte 0).
pub fn entropy_bit(block_hash: &Hash256) -> bool {
    block_hash[0] & 1 == 1
}

/// Derive the modifier carried by a block, and whether it was regenerated.
///
/// `selection_hash` is the proof-of-stake kernel hash for PoS blocks and
/// the block hash otherwise.
pub fn next_stake_modifier(
    parent_modifier: u64,
    parent_time: u32,
    block_time: u32,
    selection_hash: &Hash256,
    modifier_interval: i64,
) -> (u64, bool) {
    if modifier_interval > 0
        && (block_time as i64) / modifier_interval <= (parent_time as i64) / modifier_interval
    {
        return (parent_modifier, false);
    }

    let mut preimage = [0u8; 40];
    preimage[..8].copy_from_slice(&parent_modifier.to_le_bytes());
    preimage[8..].copy_from_slice(selection_hash);
    let digest = sha256d(&preimage);

    let mut folded = [0u8; 8];
    folded.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(folded), true)
}

/// Rolling checksum over the modifier chain, used to detect divergence
/// after an index reload.
pub fn stake_modifier_checksum(
    parent_checksum: u32,
    entropy_bit: bool,
    generated: bool,
    proof_hash: &Hash256,
    modifier: u64,
) -> u32 {
    let mut preimage = [0u8; 45];
    preimage[..4].copy_from_slice(&parent_checksum.to_le_bytes());
    preimage[4] = (entropy_bit as u8) | ((generated as u8) << 1);
    preimage[5..37].copy_from_slice(proof_hash);
    preimage[37..].copy_from_slice(&modifier.to_le_bytes());
    let digest = sha256d(&preimage);

    let mut folded = [0u8; 4];
    folded.copy_from_slice(&digest[..4]);
    u32::from_le_bytes(folded)
}
