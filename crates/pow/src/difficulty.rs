//! Difficulty and compact target utilities.

use std::cmp::Ordering;

use ember_consensus::Hash256;
use primitive_types::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    Negative,
    Overflow,
}

impl std::fmt::Display for CompactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactError::Negative => write!(f, "compact target has negative sign bit"),
            CompactError::Overflow => write!(f, "compact target overflows 256-bit range"),
        }
    }
}

impl std::error::Error for CompactError {}

pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;

    if (bits & 0x0080_0000) != 0 {
        return Err(CompactError::Negative);
    }

    let value = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        U256::from(word) << (8 * (size - 3))
    };

    if word != 0 {
        let overflow = size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32);
        if overflow {
            return Err(CompactError::Overflow);
        }
    }

    Ok(value)
}

pub fn u256_to_compact(value: U256) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let mut size = value.bits().div_ceil(8) as u32;
    let mut compact: u32;

    if size <= 3 {
        compact = value.low_u32() << (8 * (3 - size));
    } else {
        compact = (value >> (8 * (size - 3))).low_u32();
    }

    if (compact & 0x0080_0000) != 0 {
        compact >>= 8;
        size += 1;
    }

    (size << 24) | (compact & 0x007f_ffff)
}

pub fn compact_to_target(bits: u32) -> Result<Hash256, CompactError> {
    Ok(compact_to_u256(bits)?.to_little_endian())
}

pub fn target_to_compact(target: &Hash256) -> u32 {
    u256_to_compact(U256::from_little_endian(target))
}

pub fn hash_meets_target(hash: &Hash256, target: &Hash256) -> bool {
    U256::from_little_endian(hash) <= U256::from_little_endian(target)
}

pub fn cmp_be(a: &Hash256, b: &Hash256) -> Ordering {
    U256::from_little_endian(a).cmp(&U256::from_little_endian(b))
}

/// Expected number of hashes needed to produce a block at this target;
/// the proof-of-work trust contribution.
pub fn block_proof(bits: u32) -> Result<U256, CompactError> {
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Ok(U256::zero());
    }
    let one = U256::from(1u64);
    Ok((!target / (target + one)) + one)
}

/// Floating-point difficulty as a multiple of the minimum difficulty.
///
/// The mantissa ratio is normalized so the compact exponent reads as 29:
/// each missing step scales by 256, each extra step divides by 256. Display
/// and the retarget diagnostics depend on these exact iteration bounds.
pub fn difficulty_from_bits(bits: u32) -> f64 {
    let mut shift = (bits >> 24) & 0xff;
    let mut diff = 0x0000_ffff as f64 / (bits & 0x00ff_ffff) as f64;

    while shift < 29 {
        diff *= 256.0;
        shift += 1;
    }
    while shift > 29 {
        diff /= 256.0;
        shift -= 1;
    }

    diff
}
