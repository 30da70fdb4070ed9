//! Block header and block types for the hybrid PoW/PoS chain.

use ember_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::transaction::Transaction;

pub const CURRENT_VERSION: i32 = 6;

/// Which proof scheme produced a block. Registration stamps every index
/// entry with its kind; trust scoring and the stake-modifier chain branch
/// on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockKind {
    ProofOfWork,
    ProofOfStake,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::ProofOfWork => "proof-of-work",
            BlockKind::ProofOfStake => "proof-of-stake",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.encode_into(&mut encoder);
        encoder.into_inner()
    }

    fn encode_into(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_hash_le(&self.prev_block);
        encoder.write_hash_le(&self.merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            prev_block: decoder.read_hash_le()?,
            merkle_root: decoder.read_hash_le()?,
            time: decoder.read_u32_le()?,
            bits: decoder.read_u32_le()?,
            nonce: decoder.read_u32_le()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub vtx: Vec<Transaction>,
    /// Block signature; present (and required) on proof-of-stake blocks,
    /// signed by the coinstake kernel key.
    pub signature: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// A proof-of-stake block's second transaction is the coinstake.
    pub fn is_proof_of_stake(&self) -> bool {
        self.vtx.len() > 1 && self.vtx[1].is_coinstake()
    }

    pub fn kind(&self) -> BlockKind {
        if self.is_proof_of_stake() {
            BlockKind::ProofOfStake
        } else {
            BlockKind::ProofOfWork
        }
    }

    /// Merkle root over the txids, duplicating the last node on odd levels.
    pub fn merkle_root(&self) -> Hash256 {
        let mut layer: Vec<Hash256> = self.vtx.iter().map(|tx| tx.txid()).collect();
        if layer.is_empty() {
            return [0u8; 32];
        }
        while layer.len() > 1 {
            let mut next = Vec::with_capacity(layer.len().div_ceil(2));
            for pair in layer.chunks(2) {
                let left = pair[0];
                let right = *pair.last().expect("chunk is non-empty");
                let mut preimage = [0u8; 64];
                preimage[..32].copy_from_slice(&left);
                preimage[32..].copy_from_slice(&right);
                next.push(sha256d(&preimage));
            }
            layer = next;
        }
        layer[0]
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.header.encode_into(encoder);
        encoder.write_varint(self.vtx.len() as u64);
        for tx in &self.vtx {
            tx.consensus_encode(encoder);
        }
        encoder.write_var_bytes(&self.signature);
    }
}

impl Decodable for Block {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let header = BlockHeader::decode_from(decoder)?;
        let tx_count = decoder.read_varint()? as usize;
        let mut vtx = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            vtx.push(Transaction::consensus_decode(decoder)?);
        }
        let signature = decoder.read_var_bytes()?;
        Ok(Self {
            header,
            vtx,
            signature,
        })
    }
}
