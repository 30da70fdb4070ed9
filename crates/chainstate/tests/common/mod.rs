//! Shared fixtures: a regtest chain state plus block builders.

#![allow(dead_code)]

use std::sync::Arc;

use ember_chainstate::{BlockVerdict, ChainState, ReorgOutcome};
use ember_consensus::money::COIN;
use ember_consensus::params::{chain_params, ChainParams, CheckpointMode, Network};
use ember_primitives::block::{Block, BlockHeader, CURRENT_VERSION};
use ember_primitives::outpoint::OutPoint;
use ember_primitives::transaction::{Transaction, TxIn, TxOut};
use ember_storage::MemoryBlockStore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};

pub const GENESIS_TIME: u32 = 1_600_000_000;
pub const POW_BITS: u32 = 0x2007_ffff;
pub const POS_BITS: u32 = 0x2007_ffff;

/// Deterministic checkpoint keypair; the public half is installed as the
/// trusted checkpoint key of every test chain.
pub fn checkpoint_keypair() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[0xcd; 32]).expect("test secret key");
    let public = PublicKey::from_secret_key(&secp, &secret);
    (secret, public)
}

pub fn test_params(mode: CheckpointMode) -> ChainParams {
    let (_, public) = checkpoint_keypair();
    let mut params = chain_params(Network::Regtest);
    params.consensus.checkpoint_mode = mode;
    params.consensus.checkpoint_public_key = hex_static(&public.serialize());
    params
}

pub fn test_state(mode: CheckpointMode) -> ChainState<MemoryBlockStore> {
    ChainState::new(test_params(mode), Arc::new(MemoryBlockStore::new()))
}

fn hex_static(bytes: &[u8]) -> &'static str {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    Box::leak(out.into_boxed_str())
}

pub fn coinbase(time: u32, tag: u32, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: 1,
        time,
        vin: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig: tag.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        vout: outputs,
        lock_time: 0,
    }
}

pub fn pay_to_anyone(value: i64) -> TxOut {
    TxOut {
        value,
        script_pubkey: vec![0x51],
    }
}

/// A transaction spending `prevout` into a single fresh output.
pub fn spend(prevout: OutPoint, time: u32, value: i64) -> Transaction {
    Transaction {
        version: 1,
        time,
        vin: vec![TxIn {
            prevout,
            script_sig: vec![0x00],
            sequence: u32::MAX,
        }],
        vout: vec![pay_to_anyone(value)],
        lock_time: 0,
    }
}

fn seal(mut block: Block) -> Block {
    block.header.merkle_root = block.merkle_root();
    block
}

/// Proof-of-work block with a single coinbase. `tag` keeps sibling blocks
/// at the same height distinct.
pub fn pow_block(prev: [u8; 32], time: u32, tag: u32) -> Block {
    pow_block_with_coinbase(prev, time, tag, vec![pay_to_anyone(50 * COIN)])
}

pub fn pow_block_with_coinbase(prev: [u8; 32], time: u32, tag: u32, outputs: Vec<TxOut>) -> Block {
    seal(Block {
        header: BlockHeader {
            version: CURRENT_VERSION,
            prev_block: prev,
            merkle_root: [0u8; 32],
            time,
            bits: POW_BITS,
            nonce: tag,
        },
        vtx: vec![coinbase(time, tag, outputs)],
        signature: Vec::new(),
    })
}

pub fn pow_block_with_txs(prev: [u8; 32], time: u32, tag: u32, extra: Vec<Transaction>) -> Block {
    let mut vtx = vec![coinbase(time, tag, vec![pay_to_anyone(50 * COIN)])];
    vtx.extend(extra);
    seal(Block {
        header: BlockHeader {
            version: CURRENT_VERSION,
            prev_block: prev,
            merkle_root: [0u8; 32],
            time,
            bits: POW_BITS,
            nonce: tag,
        },
        vtx,
        signature: Vec::new(),
    })
}

/// Proof-of-stake block: empty coinbase, then a coinstake spending `kernel`.
pub fn pos_block(prev: [u8; 32], time: u32, tag: u32, kernel: OutPoint) -> Block {
    let coinstake = Transaction {
        version: 1,
        time,
        vin: vec![TxIn {
            prevout: kernel,
            script_sig: Vec::new(),
            sequence: u32::MAX,
        }],
        vout: vec![
            TxOut {
                value: 0,
                script_pubkey: Vec::new(),
            },
            pay_to_anyone(51 * COIN),
        ],
        lock_time: 0,
    };
    seal(Block {
        header: BlockHeader {
            version: CURRENT_VERSION,
            prev_block: prev,
            merkle_root: [0u8; 32],
            time,
            bits: POS_BITS,
            nonce: tag,
        },
        vtx: vec![coinbase(time, tag, vec![TxOut::null()]), coinstake],
        signature: vec![0xab; 70],
    })
}

/// Connect a block through the full write path and mirror it into the
/// backing store, as the node's acceptance path does.
pub fn connect(state: &mut ChainState<MemoryBlockStore>, block: &Block) -> ReorgOutcome {
    state.store().insert(block.clone());
    state
        .connect_block(
            block,
            BlockVerdict {
                mint: 50 * COIN,
                proof_of_stake_hash: if block.is_proof_of_stake() {
                    Some(block.vtx[1].txid())
                } else {
                    None
                },
            },
        )
        .expect("connect block")
}
