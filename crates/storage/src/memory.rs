use std::collections::BTreeMap;
use std::sync::RwLock;

use ember_consensus::Hash256;
use ember_primitives::block::Block;

use crate::{BlockStore, StoreError, TxLocation};

#[derive(Default)]
struct MemoryStoreInner {
    blocks: BTreeMap<Hash256, Block>,
    tx_index: BTreeMap<Hash256, TxLocation>,
}

/// Map-backed block store; the storage backend for tests and the
/// reference node shell.
#[derive(Default)]
pub struct MemoryBlockStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block: Block) {
        let hash = block.hash();
        let mut guard = self.inner.write().expect("memory store lock");
        for (tx_index, tx) in block.vtx.iter().enumerate() {
            guard.tx_index.insert(
                tx.txid(),
                TxLocation {
                    block_hash: hash,
                    tx_index,
                },
            );
        }
        guard.blocks.insert(hash, block);
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("memory store lock").blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for MemoryBlockStore {
    fn block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        Ok(guard.blocks.get(hash).cloned())
    }

    fn locate_transaction(&self, txid: &Hash256) -> Result<Option<TxLocation>, StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        Ok(guard.tx_index.get(txid).copied())
    }
}
