//! Read-side queries of the chain-state aggregate.

mod common;

use common::{connect, pos_block, pow_block, test_state, GENESIS_TIME, POS_BITS, POW_BITS};
use ember_consensus::money::COIN;
use ember_consensus::params::CheckpointMode;
use ember_pow::difficulty::difficulty_from_bits;
use ember_primitives::outpoint::OutPoint;

#[test]
fn empty_state_defaults() {
    let state = test_state(CheckpointMode::Permissive);
    assert_eq!(state.best_block_hash(), None);
    assert_eq!(state.height(), -1);
    assert_eq!(state.money_supply(), 0);
    assert_eq!(state.pow_difficulty(), 1.0);
    assert_eq!(state.pos_difficulty(), 1.0);
    assert!(state.is_initial_block_download(GENESIS_TIME as i64));
}

#[test]
fn money_supply_accumulates_mint() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);
    assert_eq!(state.money_supply(), 50 * COIN);

    connect(&mut state, &pow_block(genesis.hash(), GENESIS_TIME + 120, 1));
    assert_eq!(state.money_supply(), 100 * COIN);
}

#[test]
fn difficulty_tracks_the_last_block_of_each_kind() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    assert_eq!(state.pow_difficulty(), difficulty_from_bits(POW_BITS));
    // No stake block yet: bootstrap fallback.
    assert_eq!(state.pos_difficulty(), 1.0);

    let kernel = OutPoint::new(genesis.vtx[0].txid(), 0);
    connect(
        &mut state,
        &pos_block(genesis.hash(), GENESIS_TIME + 60, 1, kernel),
    );
    assert_eq!(state.pos_difficulty(), difficulty_from_bits(POS_BITS));
    // The stake tip does not disturb the proof-of-work reading.
    assert_eq!(state.pow_difficulty(), difficulty_from_bits(POW_BITS));
}

#[test]
fn initial_block_download_clears_once_the_tip_is_fresh() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    let now = GENESIS_TIME as i64 + 60;
    assert!(!state.is_initial_block_download(now));

    let stale = GENESIS_TIME as i64 + 3 * 24 * 60 * 60;
    assert!(state.is_initial_block_download(stale));
}

#[test]
fn verification_progress_is_clamped() {
    let mut state = test_state(CheckpointMode::Permissive);
    assert_eq!(state.verification_progress(GENESIS_TIME as i64), 0.0);

    let genesis_time = state.params().consensus.genesis_time;
    let genesis = pow_block([0u8; 32], genesis_time + 1_000, 0);
    connect(&mut state, &genesis);

    let progress = state.verification_progress(genesis_time as i64 + 2_000);
    assert!(progress > 0.0 && progress <= 1.0);

    // A tip ahead of the wall clock still reports at most 1.
    assert!(state.verification_progress(genesis_time as i64 + 10) <= 1.0);
}

#[test]
fn stake_search_interval_is_settable() {
    let mut state = test_state(CheckpointMode::Permissive);
    assert_eq!(state.stake_search_interval(), 0);
    state.set_stake_search_interval(30);
    assert_eq!(state.stake_search_interval(), 30);
}
