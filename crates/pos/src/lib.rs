//! Proof-of-stake side of consensus: stake trust and the modifier chain.

pub mod modifier;
pub mod trust;

pub use modifier::{entropy_bit, next_stake_modifier, stake_modifier_checksum, StakeModifier};
pub use trust::pos_block_trust;
