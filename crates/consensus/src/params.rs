//! Consensus parameter definitions.

use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn name(self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

/// How strongly the synchronized checkpoint constrains chain selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckpointMode {
    /// Candidates that do not descend from the checkpoint are never selected.
    Strict,
    /// Non-compliant candidates are logged but still eligible.
    Advisory,
    /// Checkpoint state is tracked for reporting only.
    Permissive,
}

impl CheckpointMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointMode::Strict => "strict",
            CheckpointMode::Advisory => "advisory",
            CheckpointMode::Permissive => "permissive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "advisory" => Some(Self::Advisory),
            "permissive" => Some(Self::Permissive),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub hash_genesis_block: Hash256,
    pub genesis_time: u32,
    pub genesis_bits: u32,
    pub pow_limit: Hash256,
    pub pos_limit: Hash256,
    pub pow_target_spacing: i64,
    pub pos_target_spacing: i64,
    /// Multiplier applied to the inverse-target proof when scoring a
    /// proof-of-stake block; keeps the two trust regimes numerically distinct.
    pub stake_trust_weight: u32,
    /// Seconds between stake-modifier regenerations.
    pub stake_modifier_interval: i64,
    /// EWMA interval (in proof-of-work blocks) for the network hash-rate
    /// estimate.
    pub pow_rate_interval: i64,
    /// Floor applied to the smoothed inter-PoW-block spacing, in seconds.
    pub pow_rate_min_spacing: i64,
    /// Number of recent proof-of-stake blocks sampled by the kernel-rate
    /// estimate.
    pub pos_rate_window: usize,
    pub checkpoint_mode: CheckpointMode,
    /// Compressed secp256k1 public key authorized to sign sync checkpoints.
    pub checkpoint_public_key: &'static str,
    pub max_reorg_depth: i64,
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
}

pub fn chain_params(network: Network) -> ChainParams {
    ChainParams {
        network,
        consensus: consensus_params(network),
    }
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
    }
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        hash_genesis_block: hash256_from_hex(
            "00000a34a941e4dfa88a4856ee77a3a4e6b63eca2804bbc00b83aefa8478f2ad",
        )
        .expect("mainnet genesis hash"),
        genesis_time: 1_538_352_000,
        genesis_bits: 0x1e0f_ffff,
        pow_limit: hash256_from_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("mainnet pow limit"),
        pos_limit: hash256_from_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("mainnet pos limit"),
        pow_target_spacing: 120,
        pos_target_spacing: 60,
        stake_trust_weight: 16,
        stake_modifier_interval: 6 * 60 * 60,
        pow_rate_interval: 240,
        pow_rate_min_spacing: 60,
        pos_rate_window: 60,
        checkpoint_mode: CheckpointMode::Strict,
        checkpoint_public_key:
            "02a8cba5d19dc19bbc94fb17b4f204f8bc0c2516ac3e160bacfd4aca95e8c9bea7",
        max_reorg_depth: 500,
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        hash_genesis_block: hash256_from_hex(
            "0000d23fa0fc52ae85bd1b141b11b9f5e10dac2fc2ca6f3969dda39c01b87e6f",
        )
        .expect("testnet genesis hash"),
        genesis_time: 1_538_352_000,
        genesis_bits: 0x1f00_ffff,
        pow_limit: hash256_from_hex(
            "0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("testnet pow limit"),
        pos_limit: hash256_from_hex(
            "0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("testnet pos limit"),
        pow_target_spacing: 120,
        pos_target_spacing: 60,
        stake_trust_weight: 16,
        stake_modifier_interval: 60 * 60,
        pow_rate_interval: 240,
        pow_rate_min_spacing: 60,
        pos_rate_window: 60,
        checkpoint_mode: CheckpointMode::Advisory,
        checkpoint_public_key:
            "03f0e92e9cfe68e04e3a43d3e94798eaa4cbbc0e1bead0a9f7e5bbb1c237e72a11",
        max_reorg_depth: 500,
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        // Regtest fixtures install their own genesis block.
        hash_genesis_block: [0u8; 32],
        genesis_time: 1_538_352_000,
        genesis_bits: 0x2007_ffff,
        pow_limit: hash256_from_hex(
            "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("regtest pow limit"),
        pos_limit: hash256_from_hex(
            "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("regtest pos limit"),
        pow_target_spacing: 120,
        pos_target_spacing: 60,
        stake_trust_weight: 16,
        stake_modifier_interval: 60,
        pow_rate_interval: 240,
        pow_rate_min_spacing: 60,
        pos_rate_window: 60,
        checkpoint_mode: CheckpointMode::Strict,
        checkpoint_public_key:
            "02a8cba5d19dc19bbc94fb17b4f204f8bc0c2516ac3e160bacfd4aca95e8c9bea7",
        max_reorg_depth: 500,
    }
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

/// Parse a display-order (big-endian) hex string into a little-endian hash.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }

    if hex.is_empty() || hex.len() > 64 {
        return Err(HexError::InvalidLength);
    }

    let mut padded = String::with_capacity(64);
    for _ in 0..(64 - hex.len()) {
        padded.push('0');
    }
    padded.push_str(hex);

    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        let byte = u8::from_str_radix(&padded[start..start + 2], 16)
            .map_err(|_| HexError::InvalidHex)?;
        *byte_out = byte;
    }
    bytes.reverse();

    Ok(bytes)
}

/// Render a little-endian hash as the display-order hex used by every RPC
/// response (`GetHex` in the legacy daemon).
pub fn hash256_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
