//! The consensus-state aggregate.
//!
//! One `ChainState` exists per process. Every mutation (registration,
//! scoring, reorganization, checkpoint application) goes through `&mut
//! self`, so wrapping the aggregate in a single `RwLock` gives the
//! single-writer/many-reader model the queries rely on: a read guard
//! observes a consistent snapshot, never a reorg mid-flight.

use std::fmt;
use std::sync::Arc;

use ember_consensus::constants::GENESIS_BASE_TRUST;
use ember_consensus::money::Amount;
use ember_consensus::{ChainParams, Hash256};
use ember_pos::modifier::{
    entropy_bit, next_stake_modifier, stake_modifier_checksum, StakeModifier,
};
use ember_pos::trust::pos_block_trust;
use ember_pow::difficulty::{block_proof, difficulty_from_bits, CompactError};
use ember_primitives::block::{Block, BlockHeader, BlockKind};
use ember_storage::{BlockStore, StoreError};
use primitive_types::U256;

use crate::checkpoints::{CheckpointError, CheckpointPolicy, SignedCheckpoint};
use crate::entry::{EntryId, EntryScore};
use crate::index::{ChainError, ChainIndex, ReorgOutcome};
use crate::rates;
use crate::scan::{self, MempoolLookup, ScanError, UnspentInfo};

#[derive(Debug)]
pub enum StateError {
    Chain(ChainError),
    Checkpoint(CheckpointError),
    Compact(CompactError),
    Store(StoreError),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Chain(err) => write!(f, "{err}"),
            StateError::Checkpoint(err) => write!(f, "{err}"),
            StateError::Compact(err) => write!(f, "{err}"),
            StateError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StateError {}

impl From<ChainError> for StateError {
    fn from(err: ChainError) -> Self {
        StateError::Chain(err)
    }
}

impl From<CheckpointError> for StateError {
    fn from(err: CheckpointError) -> Self {
        StateError::Checkpoint(err)
    }
}

impl From<CompactError> for StateError {
    fn from(err: CompactError) -> Self {
        StateError::Compact(err)
    }
}

impl From<StoreError> for StateError {
    fn from(err: StoreError) -> Self {
        StateError::Store(err)
    }
}

/// Validation verdict handed to `connect_block` alongside the block: the
/// coin-supply delta and, for PoS blocks, the kernel proof hash. Script
/// and proof verification happen upstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockVerdict {
    pub mint: Amount,
    pub proof_of_stake_hash: Option<Hash256>,
}

pub struct ChainState<S> {
    params: ChainParams,
    index: ChainIndex,
    checkpoints: CheckpointPolicy,
    store: Arc<S>,
    /// Last coin-stake search interval reported by the staking wallet;
    /// surfaced by `getdifficulty`.
    stake_search_interval: i64,
}

impl<S: BlockStore> ChainState<S> {
    pub fn new(params: ChainParams, store: Arc<S>) -> Self {
        let checkpoints = CheckpointPolicy::from_params(&params.consensus);
        Self {
            params,
            index: ChainIndex::new(),
            checkpoints,
            store,
            stake_search_interval: 0,
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn index(&self) -> &ChainIndex {
        &self.index
    }

    pub fn checkpoints(&self) -> &CheckpointPolicy {
        &self.checkpoints
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stake_search_interval(&self) -> i64 {
        self.stake_search_interval
    }

    pub fn set_stake_search_interval(&mut self, interval: i64) {
        self.stake_search_interval = interval;
    }

    /// Index a validated header without scoring it. Promotes a pending
    /// checkpoint if this is the block it was waiting for.
    pub fn register_header(
        &mut self,
        header: &BlockHeader,
        kind: BlockKind,
    ) -> Result<EntryId, StateError> {
        let id = self.index.register(header, kind)?;
        let hash = self.index.entry(id).hash;
        self.checkpoints.notice_registered(&self.index, &hash);
        Ok(id)
    }

    /// Score a registered block: compute its trust contribution, stamp the
    /// stake-modifier chain, and accumulate supply. Fails atomically; a
    /// failed call leaves the entry unscored.
    pub fn score_block(&mut self, hash: &Hash256, verdict: BlockVerdict) -> Result<(), StateError> {
        let id = self
            .index
            .find_by_hash(hash)
            .ok_or(ChainError::UnknownBlock(*hash))?;
        let score = self.build_score(id, verdict)?;
        self.index.score(id, score)?;
        Ok(())
    }

    /// The full write path: register, score, and re-run chain selection.
    pub fn connect_block(
        &mut self,
        block: &Block,
        verdict: BlockVerdict,
    ) -> Result<ReorgOutcome, StateError> {
        let kind = block.kind();
        self.register_header(&block.header, kind)?;
        self.score_block(&block.hash(), verdict)?;
        Ok(self.reconsider_best_chain())
    }

    /// Re-evaluate best-chain selection under the current checkpoint
    /// policy. Always safe to call; no-op when nothing improved.
    pub fn reconsider_best_chain(&mut self) -> ReorgOutcome {
        self.index
            .reconsider_best_chain(&self.checkpoints, self.params.consensus.max_reorg_depth)
    }

    /// Verify and apply a signed sync checkpoint, then re-run selection so
    /// a now-ineligible tip is abandoned immediately.
    pub fn apply_checkpoint(
        &mut self,
        msg: &SignedCheckpoint,
    ) -> Result<ReorgOutcome, StateError> {
        self.checkpoints.apply(msg, &self.index)?;
        Ok(self.reconsider_best_chain())
    }

    fn build_score(&self, id: EntryId, verdict: BlockVerdict) -> Result<EntryScore, StateError> {
        let entry = self.index.entry(id);
        let consensus = &self.params.consensus;

        let block_trust = if entry.height == 0 {
            U256::from(GENESIS_BASE_TRUST)
        } else {
            match entry.kind {
                BlockKind::ProofOfWork => block_proof(entry.bits)?,
                BlockKind::ProofOfStake => {
                    pos_block_trust(entry.bits, consensus.stake_trust_weight)?
                }
            }
        };
        let work = match entry.kind {
            BlockKind::ProofOfWork => block_proof(entry.bits)?,
            BlockKind::ProofOfStake => U256::zero(),
        };

        let (parent_trust, parent_work, parent_supply, parent_modifier, parent_checksum, parent_time) =
            match entry.parent {
                Some(parent_id) => {
                    let parent = self.index.entry(parent_id);
                    let score = parent
                        .score
                        .as_ref()
                        .ok_or(ChainError::NotScored(parent.hash))?;
                    (
                        score.chain_trust,
                        score.chain_work,
                        score.money_supply,
                        score.stake.modifier,
                        score.stake.checksum,
                        parent.time,
                    )
                }
                None => (U256::zero(), U256::zero(), 0, 0, 0, 0),
            };

        let selection_hash = verdict.proof_of_stake_hash.unwrap_or(entry.hash);
        let (modifier, generated) = next_stake_modifier(
            parent_modifier,
            parent_time,
            entry.time,
            &selection_hash,
            consensus.stake_modifier_interval,
        );
        let entropy = entropy_bit(&entry.hash);
        let checksum =
            stake_modifier_checksum(parent_checksum, entropy, generated, &selection_hash, modifier);

        Ok(EntryScore {
            block_trust,
            chain_trust: parent_trust.saturating_add(block_trust),
            chain_work: parent_work.saturating_add(work),
            mint: verdict.mint,
            money_supply: parent_supply + verdict.mint,
            stake: StakeModifier {
                modifier,
                checksum,
                generated,
                entropy_bit: entropy,
            },
            proof_of_stake_hash: verdict.proof_of_stake_hash,
        })
    }

    // Query side. All read-only; callers hold the aggregate's read lock.

    pub fn best_block_hash(&self) -> Option<Hash256> {
        self.index.best_entry().map(|entry| entry.hash)
    }

    pub fn height(&self) -> i64 {
        self.index.height()
    }

    pub fn money_supply(&self) -> Amount {
        self.index
            .best_entry()
            .and_then(|entry| entry.score.as_ref())
            .map(|score| score.money_supply)
            .unwrap_or(0)
    }

    /// Difficulty of an entry, or of the last proof-of-work block when no
    /// entry is given. 1.0 on an empty chain (bootstrap).
    pub fn difficulty(&self, entry: Option<EntryId>) -> f64 {
        let id = entry.or_else(|| {
            self.index
                .best()
                .and_then(|best| self.index.last_of_kind(best, BlockKind::ProofOfWork))
        });
        match id {
            Some(id) => difficulty_from_bits(self.index.entry(id).bits),
            None => 1.0,
        }
    }

    pub fn pow_difficulty(&self) -> f64 {
        self.difficulty(None)
    }

    pub fn pos_difficulty(&self) -> f64 {
        self.index
            .best()
            .and_then(|best| self.index.last_of_kind(best, BlockKind::ProofOfStake))
            .map(|id| difficulty_from_bits(self.index.entry(id).bits))
            .unwrap_or(1.0)
    }

    pub fn network_hash_ps(&self) -> f64 {
        rates::network_hash_ps(&self.index, &self.params.consensus)
    }

    pub fn stake_kernel_ps(&self) -> f64 {
        rates::stake_kernel_ps(&self.index, &self.params.consensus)
    }

    pub fn verification_progress(&self, now_unix: i64) -> f64 {
        self.checkpoints
            .verification_progress(&self.index, self.params.consensus.genesis_time, now_unix)
    }

    /// Initial-block-download heuristic: the tip is more than a day behind
    /// the wall clock. Display only.
    pub fn is_initial_block_download(&self, now_unix: i64) -> bool {
        match self.index.best_entry() {
            Some(tip) => now_unix - (tip.time as i64) > 24 * 60 * 60,
            None => true,
        }
    }

    pub fn unspent_output(
        &self,
        txid: &Hash256,
        vout: u32,
        mempool: Option<&dyn MempoolLookup>,
    ) -> Result<Option<UnspentInfo>, ScanError> {
        scan::unspent_output(&self.index, self.store.as_ref(), txid, vout, mempool)
    }
}
