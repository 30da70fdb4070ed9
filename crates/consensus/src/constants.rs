//! Consensus-wide constants shared across validation and chain selection.

/// Trust assigned to the genesis entry; every other entry adds its own
/// block trust on top of the parent's chain trust.
pub const GENESIS_BASE_TRUST: u64 = 1;
/// 2^32 expressed in the millions-of-hashes unit the hash-rate estimate
/// reports (the legacy daemon's `4294.967296` literal).
pub const MHASH_SCALE: f64 = 4_294.967_296;
/// 2^32 as a float, used when accumulating per-block kernel search space.
pub const HASH_SPACE_PER_DIFFICULTY: f64 = 4_294_967_296.0;
