//! Per-block index entries.
//!
//! Entries live in an arena owned by [`crate::index::ChainIndex`] and refer
//! to each other by [`EntryId`], never by pointer: `parent` is the stable
//! ancestry link, `successor` is derived state rewritten on every reorg and
//! only meaningful for main-chain entries.

use ember_consensus::money::Amount;
use ember_consensus::Hash256;
use ember_pos::modifier::StakeModifier;
use ember_primitives::block::{BlockHeader, BlockKind};
use primitive_types::U256;

/// Stable handle into the index arena. Ids are assigned in registration
/// order, which doubles as the tie-break for equal chain trust.
pub type EntryId = usize;

#[derive(Clone, Debug)]
pub struct BlockIndexEntry {
    pub hash: Hash256,
    pub height: i64,
    pub parent: Option<EntryId>,
    pub successor: Option<EntryId>,
    pub time: u32,
    pub bits: u32,
    pub version: i32,
    pub merkle_root: Hash256,
    pub nonce: u32,
    pub kind: BlockKind,
    /// Set exactly once, when the block is scored after validation.
    pub score: Option<EntryScore>,
}

/// Trust, supply, and stake fields stamped at score time. Write-once.
#[derive(Clone, Debug)]
pub struct EntryScore {
    pub block_trust: U256,
    pub chain_trust: U256,
    /// Cumulative proof-of-work-equivalent work; reported separately from
    /// trust for diagnostics and never used for selection.
    pub chain_work: U256,
    pub mint: Amount,
    pub money_supply: Amount,
    pub stake: StakeModifier,
    pub proof_of_stake_hash: Option<Hash256>,
}

impl BlockIndexEntry {
    pub fn from_header(
        header: &BlockHeader,
        hash: Hash256,
        height: i64,
        parent: Option<EntryId>,
        kind: BlockKind,
    ) -> Self {
        Self {
            hash,
            height,
            parent,
            successor: None,
            time: header.time,
            bits: header.bits,
            version: header.version,
            merkle_root: header.merkle_root,
            nonce: header.nonce,
            kind,
            score: None,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.kind == BlockKind::ProofOfStake
    }

    pub fn chain_trust(&self) -> Option<U256> {
        self.score.as_ref().map(|score| score.chain_trust)
    }

    /// The hash displayed as `proofhash`: the kernel hash for PoS entries,
    /// the block hash otherwise.
    pub fn proof_hash(&self) -> Hash256 {
        self.score
            .as_ref()
            .and_then(|score| score.proof_of_stake_hash)
            .unwrap_or(self.hash)
    }
}
