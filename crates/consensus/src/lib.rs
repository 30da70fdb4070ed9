//! Consensus constants, monetary units, and chain parameters.

pub mod constants;
pub mod money;
pub mod params;

/// 32-byte hash, stored little-endian (the byte order produced by sha256d).
pub type Hash256 = [u8; 32];

pub use params::{
    chain_params, hash256_from_hex, hash256_to_hex, ChainParams, CheckpointMode, ConsensusParams,
    HexError, Network,
};
