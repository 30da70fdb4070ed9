//! Network rate estimates derived from recent block spacing.
//!
//! Read-only consumers of the index; both walks are checkpointable at
//! block granularity and hold no state between calls.

use ember_consensus::constants::{HASH_SPACE_PER_DIFFICULTY, MHASH_SCALE};
use ember_consensus::ConsensusParams;
use ember_pow::difficulty::difficulty_from_bits;
use ember_primitives::block::BlockKind;

use crate::index::ChainIndex;

/// Exponentially-weighted estimate of the proof-of-work hash rate, in
/// MHash/s.
///
/// Walks the main chain genesis-forward; each PoW block folds its actual
/// spacing into the running average with weight `(interval - 1)` against
/// twice the latest sample, floored at the configured minimum spacing so a
/// burst of fast blocks cannot blow the estimate up.
pub fn network_hash_ps(index: &ChainIndex, params: &ConsensusParams) -> f64 {
    let interval = params.pow_rate_interval;
    let min_spacing = params.pow_rate_min_spacing;
    let mut spacing = min_spacing;

    let mut prev_work_time = match index.find_by_height(0) {
        Some(genesis) => index.entry(genesis).time as i64,
        None => return 0.0,
    };

    let mut cursor = index.find_by_height(0);
    while let Some(id) = cursor {
        let entry = index.entry(id);
        if entry.kind == BlockKind::ProofOfWork {
            let actual = entry.time as i64 - prev_work_time;
            spacing = ((interval - 1) * spacing + actual + actual) / (interval + 1);
            spacing = spacing.max(min_spacing);
            prev_work_time = entry.time as i64;
        }
        cursor = entry.successor;
    }

    let difficulty = index
        .best()
        .and_then(|best| index.last_of_kind(best, BlockKind::ProofOfWork))
        .map(|id| difficulty_from_bits(index.entry(id).bits))
        .unwrap_or(1.0);

    difficulty * MHASH_SCALE / spacing as f64
}

/// Stake-kernel search rate over the most recent window of proof-of-stake
/// blocks, in kernel hashes per second. Zero when no inter-stake time has
/// been observed yet.
pub fn stake_kernel_ps(index: &ChainIndex, params: &ConsensusParams) -> f64 {
    let mut kernels_tried = 0.0f64;
    let mut stakes_time = 0i64;
    let mut stakes_handled = 0usize;
    let mut later_stake_time: Option<i64> = None;

    let mut cursor = index.best();
    while let Some(id) = cursor {
        if stakes_handled >= params.pos_rate_window {
            break;
        }
        let entry = index.entry(id);
        if entry.kind == BlockKind::ProofOfStake {
            kernels_tried += difficulty_from_bits(entry.bits) * HASH_SPACE_PER_DIFFICULTY;
            if let Some(later) = later_stake_time {
                stakes_time += later - entry.time as i64;
            }
            later_stake_time = Some(entry.time as i64);
            stakes_handled += 1;
        }
        cursor = entry.parent;
    }

    if stakes_time > 0 {
        kernels_tried / stakes_time as f64
    } else {
        0.0
    }
}
