//! Minimal transaction pool backing the RPC query surface.
//!
//! Holds verified loose transactions by txid. Acceptance policy (fees,
//! standardness, conflict checks) lives with the relay path; the pool
//! itself only answers lookups and keeps itself consistent across
//! connected blocks.

use std::collections::BTreeMap;

use ember_chainstate::scan::MempoolLookup;
use ember_consensus::{hash256_to_hex, Hash256};
use ember_primitives::block::Block;
use ember_primitives::transaction::Transaction;

#[derive(Default)]
pub struct Mempool {
    txs: BTreeMap<Hash256, Transaction>,
}

impl Mempool {
    pub fn insert(&mut self, tx: Transaction) -> bool {
        let txid = tx.txid();
        let inserted = self.txs.insert(txid, tx).is_none();
        if inserted {
            ember_log::log_debug!("mempool accepted {}", hash256_to_hex(&txid));
        }
        inserted
    }

    pub fn remove(&mut self, txid: &Hash256) -> Option<Transaction> {
        self.txs.remove(txid)
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.txs.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&Transaction> {
        self.txs.get(txid)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Txids in lexicographic hash order, the `getrawmempool` payload.
    pub fn query_hashes(&self) -> Vec<Hash256> {
        self.txs.keys().copied().collect()
    }

    /// Drop every pool entry confirmed by a connected block.
    pub fn remove_confirmed(&mut self, block: &Block) {
        for tx in &block.vtx {
            self.txs.remove(&tx.txid());
        }
    }
}

/// Read-only view handed to the unspent scanner.
pub struct MempoolView<'a>(pub &'a Mempool);

impl MempoolLookup for MempoolView<'_> {
    fn transaction(&self, txid: &Hash256) -> Option<Transaction> {
        self.0.get(txid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_primitives::outpoint::OutPoint;
    use ember_primitives::transaction::{TxIn, TxOut};

    fn loose_tx(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            time: 1_600_000_000,
            vin: vec![TxIn {
                prevout: OutPoint::new([tag; 32], 0),
                script_sig: Vec::new(),
                sequence: u32::MAX,
            }],
            vout: vec![TxOut {
                value: 1_000,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut pool = Mempool::default();
        let tx = loose_tx(1);
        assert!(pool.insert(tx.clone()));
        assert!(!pool.insert(tx.clone()));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&tx.txid()));
    }

    #[test]
    fn query_hashes_is_sorted() {
        let mut pool = Mempool::default();
        let a = loose_tx(1);
        let b = loose_tx(2);
        pool.insert(a.clone());
        pool.insert(b.clone());
        let mut expected = vec![a.txid(), b.txid()];
        expected.sort();
        assert_eq!(pool.query_hashes(), expected);
    }

    #[test]
    fn view_resolves_pool_transactions() {
        let mut pool = Mempool::default();
        let tx = loose_tx(3);
        let txid = tx.txid();
        pool.insert(tx.clone());

        let view = MempoolView(&pool);
        use ember_chainstate::scan::MempoolLookup as _;
        assert_eq!(view.transaction(&txid), Some(tx));
        assert_eq!(view.transaction(&[0u8; 32]), None);
    }
}
