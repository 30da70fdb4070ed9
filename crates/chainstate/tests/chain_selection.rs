//! Best-chain selection through the full write path: register, score,
//! reconsider.

mod common;

use common::{connect, pos_block, pow_block, test_state, GENESIS_TIME};
use ember_chainstate::{BlockVerdict, ChainError, StateError};
use ember_consensus::params::CheckpointMode;
use ember_primitives::block::BlockKind;
use ember_primitives::outpoint::OutPoint;

#[test]
fn genesis_becomes_tip() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);

    let outcome = connect(&mut state, &genesis);

    assert_eq!(outcome.connected, vec![genesis.hash()]);
    assert!(outcome.disconnected.is_empty());
    assert_eq!(state.best_block_hash(), Some(genesis.hash()));
    assert_eq!(state.height(), 0);
}

#[test]
fn extending_the_chain_advances_the_tip() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    let child = pow_block(genesis.hash(), GENESIS_TIME + 120, 1);

    connect(&mut state, &genesis);
    let outcome = connect(&mut state, &child);

    assert_eq!(outcome.connected, vec![child.hash()]);
    assert!(outcome.disconnected.is_empty());
    assert_eq!(state.best_block_hash(), Some(child.hash()));
    assert_eq!(state.height(), 1);

    // The successor link tracks the main chain.
    let index = state.index();
    let genesis_id = index.find_by_hash(&genesis.hash()).expect("genesis");
    let child_id = index.find_by_hash(&child.hash()).expect("child");
    assert_eq!(index.entry(genesis_id).successor, Some(child_id));
    assert_eq!(index.find_by_height(1), Some(child_id));
}

#[test]
fn equal_trust_fork_keeps_the_first_seen_tip() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    let first = pow_block(genesis.hash(), GENESIS_TIME + 120, 1);
    let second = pow_block(genesis.hash(), GENESIS_TIME + 120, 2);

    connect(&mut state, &genesis);
    connect(&mut state, &first);
    let outcome = connect(&mut state, &second);

    // Same bits at the same height: identical chain trust must not flip
    // the tip.
    assert!(outcome.is_noop());
    assert_eq!(state.best_block_hash(), Some(first.hash()));

    // Re-running selection with nothing new is also a no-op.
    assert!(state.reconsider_best_chain().is_noop());
    assert_eq!(state.best_block_hash(), Some(first.hash()));
}

#[test]
fn higher_trust_stake_branch_displaces_the_tip() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    let work_child = pow_block(genesis.hash(), GENESIS_TIME + 120, 1);
    let kernel = OutPoint::new(genesis.vtx[0].txid(), 0);
    let stake_child = pos_block(genesis.hash(), GENESIS_TIME + 180, 2, kernel);

    connect(&mut state, &genesis);
    connect(&mut state, &work_child);
    assert_eq!(state.best_block_hash(), Some(work_child.hash()));

    // The stake block carries the stake trust weight, so the fork wins.
    let outcome = connect(&mut state, &stake_child);
    assert_eq!(outcome.disconnected, vec![work_child.hash()]);
    assert_eq!(outcome.connected, vec![stake_child.hash()]);
    assert_eq!(state.best_block_hash(), Some(stake_child.hash()));

    // The losing sibling stays indexed but off the main chain.
    let index = state.index();
    let loser = index.find_by_hash(&work_child.hash()).expect("loser");
    assert!(!index.is_in_main_chain(loser));
    assert_eq!(index.entry(loser).successor, None);

    let genesis_id = index.find_by_hash(&genesis.hash()).expect("genesis");
    let winner = index.find_by_hash(&stake_child.hash()).expect("winner");
    assert_eq!(index.entry(genesis_id).successor, Some(winner));
}

#[test]
fn chain_trust_accumulates_monotonically() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    let mut prev_hash = genesis.hash();
    let mut prev_trust = state
        .index()
        .best_entry()
        .and_then(|entry| entry.chain_trust())
        .expect("genesis trust");

    for i in 1..6u32 {
        let block = pow_block(prev_hash, GENESIS_TIME + i * 120, i);
        connect(&mut state, &block);
        let entry = state.index().best_entry().expect("tip");
        let trust = entry.chain_trust().expect("tip trust");
        let score = entry.score.as_ref().expect("tip score");
        assert_eq!(trust, prev_trust + score.block_trust);
        assert!(trust > prev_trust);
        prev_trust = trust;
        prev_hash = block.hash();
    }
}

#[test]
fn orphan_block_is_rejected_without_side_effects() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    let orphan = pow_block([0x99; 32], GENESIS_TIME + 120, 7);
    let before = state.index().len();
    let err = state
        .connect_block(&orphan, BlockVerdict::default())
        .expect_err("orphan must fail");

    assert!(matches!(
        err,
        StateError::Chain(ChainError::OrphanBlock(hash)) if hash == [0x99; 32]
    ));
    assert_eq!(state.index().len(), before);
    assert_eq!(state.best_block_hash(), Some(genesis.hash()));
}

#[test]
fn duplicate_block_is_rejected() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    let err = state
        .connect_block(&genesis, BlockVerdict::default())
        .expect_err("duplicate must fail");
    assert!(matches!(
        err,
        StateError::Chain(ChainError::DuplicateBlock(hash)) if hash == genesis.hash()
    ));
}

#[test]
fn second_genesis_is_rejected() {
    let mut state = test_state(CheckpointMode::Permissive);
    connect(&mut state, &pow_block([0u8; 32], GENESIS_TIME, 0));

    let rival = pow_block([0u8; 32], GENESIS_TIME + 60, 1);
    let err = state
        .connect_block(&rival, BlockVerdict::default())
        .expect_err("second genesis must fail");
    assert!(matches!(
        err,
        StateError::Chain(ChainError::UnexpectedGenesis(_))
    ));
}

#[test]
fn scoring_an_entry_twice_is_rejected() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);
    let supply = state.money_supply();
    let trust = state
        .index()
        .best_entry()
        .and_then(|entry| entry.chain_trust())
        .expect("genesis trust");

    let err = state
        .score_block(&genesis.hash(), BlockVerdict::default())
        .expect_err("second score must fail");
    assert!(matches!(
        err,
        StateError::Chain(ChainError::AlreadyScored(hash)) if hash == genesis.hash()
    ));

    // The original score is untouched.
    assert_eq!(state.money_supply(), supply);
    assert_eq!(
        state
            .index()
            .best_entry()
            .and_then(|entry| entry.chain_trust()),
        Some(trust)
    );
    assert_eq!(state.best_block_hash(), Some(genesis.hash()));
}

#[test]
fn scoring_on_an_unscored_parent_fails() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    let child = pow_block(genesis.hash(), GENESIS_TIME + 120, 1);

    // Register both headers but never score the genesis.
    state
        .register_header(&genesis.header, BlockKind::ProofOfWork)
        .expect("register genesis");
    state
        .register_header(&child.header, BlockKind::ProofOfWork)
        .expect("register child");

    let err = state
        .score_block(&child.hash(), BlockVerdict::default())
        .expect_err("unscored parent must fail");
    assert!(matches!(
        err,
        StateError::Chain(ChainError::NotScored(hash)) if hash == genesis.hash()
    ));
}

#[test]
fn deep_reorganization_is_refused() {
    let mut params = common::test_params(CheckpointMode::Permissive);
    params.consensus.max_reorg_depth = 1;
    let mut state = ember_chainstate::ChainState::new(
        params,
        std::sync::Arc::new(ember_storage::MemoryBlockStore::new()),
    );
    let state = &mut state;

    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    let a1 = pow_block(genesis.hash(), GENESIS_TIME + 120, 1);
    let a2 = pow_block(a1.hash(), GENESIS_TIME + 240, 2);
    connect(state, &genesis);
    connect(state, &a1);
    connect(state, &a2);

    // A stake branch forking at the genesis would reorganize two blocks
    // deep, past the configured limit.
    let kernel = OutPoint::new(genesis.vtx[0].txid(), 0);
    let b1 = pos_block(genesis.hash(), GENESIS_TIME + 60, 3, kernel);
    let outcome = connect(state, &b1);

    assert!(outcome.is_noop());
    assert_eq!(state.best_block_hash(), Some(a2.hash()));
}
