//! Block body storage boundary.
//!
//! The consensus core never performs disk I/O itself; full block bodies
//! live behind the [`BlockStore`] trait, and the node wires in whatever
//! backend it runs on. The in-memory backend doubles as the test fixture.

use std::fmt;

use ember_consensus::Hash256;
use ember_primitives::block::Block;

pub mod memory;

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Where a transaction lives: its containing block, or none while it is
/// only known to the mempool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxLocation {
    pub block_hash: Hash256,
    pub tx_index: usize,
}

/// Read access to full block bodies and the transaction index, keyed by
/// hash. Headers the index knows about may legitimately have no body yet.
pub trait BlockStore {
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError>;

    fn locate_transaction(&self, txid: &Hash256) -> Result<Option<TxLocation>, StoreError>;
}

pub use memory::MemoryBlockStore;
