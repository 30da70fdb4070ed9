//! Unspent-output queries across the output lifecycle.

mod common;

use std::collections::HashMap;

use common::{
    connect, pay_to_anyone, pos_block, pow_block, pow_block_with_txs, spend, test_state,
    GENESIS_TIME,
};
use ember_chainstate::scan::{MempoolLookup, ScanError};
use ember_consensus::money::COIN;
use ember_consensus::Hash256;
use ember_consensus::params::CheckpointMode;
use ember_primitives::outpoint::OutPoint;
use ember_primitives::transaction::Transaction;

#[derive(Default)]
struct TestPool {
    txs: HashMap<Hash256, Transaction>,
}

impl TestPool {
    fn add(&mut self, tx: Transaction) {
        self.txs.insert(tx.txid(), tx);
    }
}

impl MempoolLookup for TestPool {
    fn transaction(&self, txid: &Hash256) -> Option<Transaction> {
        self.txs.get(txid).cloned()
    }
}

#[test]
fn confirmed_output_is_reported_unspent() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);
    let child = pow_block(genesis.hash(), GENESIS_TIME + 120, 1);
    connect(&mut state, &child);

    let txid = genesis.vtx[0].txid();
    let info = state
        .unspent_output(&txid, 0, None)
        .expect("scan")
        .expect("unspent");

    assert_eq!(info.best_block, child.hash());
    assert_eq!(info.confirmations, 2);
    assert_eq!(info.value, 50 * COIN);
    assert!(info.coinbase);
    assert!(!info.coinstake);
}

#[test]
fn spent_output_is_reported_absent() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    let funding = genesis.vtx[0].txid();
    let spender = spend(OutPoint::new(funding, 0), GENESIS_TIME + 120, 49 * COIN);
    let child = pow_block_with_txs(genesis.hash(), GENESIS_TIME + 120, 1, vec![spender]);
    connect(&mut state, &child);

    // Spent on the main chain: absence, not an error.
    let result = state.unspent_output(&funding, 0, None).expect("scan");
    assert_eq!(result, None);
}

#[test]
fn spend_scan_matches_the_exact_output_index() {
    let mut state = test_state(CheckpointMode::Permissive);

    // A funding transaction with two outputs, of which only vout 0 gets
    // spent. vout 1 must stay visible no matter which index the spending
    // input carries.
    let genesis = common::pow_block_with_coinbase(
        [0u8; 32],
        GENESIS_TIME,
        0,
        vec![pay_to_anyone(50 * COIN), pay_to_anyone(20 * COIN)],
    );
    let funding_txid = genesis.vtx[0].txid();
    connect(&mut state, &genesis);

    let spender = spend(
        OutPoint::new(funding_txid, 0),
        GENESIS_TIME + 120,
        49 * COIN,
    );
    let child = pow_block_with_txs(genesis.hash(), GENESIS_TIME + 120, 1, vec![spender]);
    connect(&mut state, &child);

    assert_eq!(
        state.unspent_output(&funding_txid, 0, None).expect("scan"),
        None
    );
    let survivor = state
        .unspent_output(&funding_txid, 1, None)
        .expect("scan")
        .expect("vout 1 unspent");
    assert_eq!(survivor.value, 20 * COIN);
    assert_eq!(survivor.confirmations, 2);
}

#[test]
fn out_of_range_index_is_an_error() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    let err = state
        .unspent_output(&genesis.vtx[0].txid(), 5, None)
        .expect_err("index out of range");
    assert!(matches!(err, ScanError::OutputIndexOutOfRange));
}

#[test]
fn nulled_output_is_an_error() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);
    let kernel = OutPoint::new(genesis.vtx[0].txid(), 0);
    let stake = pos_block(genesis.hash(), GENESIS_TIME + 60, 1, kernel);
    connect(&mut state, &stake);

    // The stake block's coinbase output is marked null in place; it exists
    // but can never be spent.
    let err = state
        .unspent_output(&stake.vtx[0].txid(), 0, None)
        .expect_err("nulled output");
    assert!(matches!(err, ScanError::NullOutput));
}

#[test]
fn unknown_transaction_is_an_error() {
    let mut state = test_state(CheckpointMode::Permissive);
    connect(&mut state, &pow_block([0u8; 32], GENESIS_TIME, 0));

    let err = state
        .unspent_output(&[0x77; 32], 0, None)
        .expect_err("unknown txid");
    assert!(matches!(err, ScanError::UnknownTransaction));
}

#[test]
fn mempool_output_has_zero_confirmations() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    connect(&mut state, &genesis);

    let mut pool = TestPool::default();
    let pending = spend(
        OutPoint::new(genesis.vtx[0].txid(), 0),
        GENESIS_TIME + 60,
        49 * COIN,
    );
    let pending_txid = pending.txid();
    pool.add(pending);

    let info = state
        .unspent_output(&pending_txid, 0, Some(&pool))
        .expect("scan")
        .expect("unspent");
    assert_eq!(info.confirmations, 0);
    assert_eq!(info.value, 49 * COIN);
    assert!(!info.coinbase);

    // Without the pool the transaction is simply unknown.
    let err = state
        .unspent_output(&pending_txid, 0, None)
        .expect_err("not in chain");
    assert!(matches!(err, ScanError::UnknownTransaction));
}

#[test]
fn side_chain_output_has_zero_confirmations() {
    let mut state = test_state(CheckpointMode::Permissive);
    let genesis = pow_block([0u8; 32], GENESIS_TIME, 0);
    let main_child = pow_block(genesis.hash(), GENESIS_TIME + 120, 1);
    let side_child = pow_block(genesis.hash(), GENESIS_TIME + 120, 2);

    connect(&mut state, &genesis);
    connect(&mut state, &main_child);
    connect(&mut state, &side_child);
    assert_eq!(state.best_block_hash(), Some(main_child.hash()));

    // The side-chain coinbase is unspent by definition; no spend scan runs
    // off the main chain.
    let info = state
        .unspent_output(&side_child.vtx[0].txid(), 0, None)
        .expect("scan")
        .expect("unspent");
    assert_eq!(info.confirmations, 0);
    assert_eq!(info.best_block, main_child.hash());
}
