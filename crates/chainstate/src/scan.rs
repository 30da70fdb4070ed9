//! Unspent-output lookup by forward scan.
//!
//! The production stand-in for a spent-output index: find the transaction,
//! then walk the main chain forward from its containing block checking
//! every input against the queried outpoint. Linear in the chain length
//! since the output's block; the externally observable contract (zero-conf
//! semantics, absence for spent outputs) is what matters here.

use std::fmt;

use ember_consensus::money::Amount;
use ember_consensus::{hash256_to_hex, Hash256};
use ember_primitives::transaction::Transaction;
use ember_storage::{BlockStore, StoreError};

use crate::index::ChainIndex;

#[derive(Debug)]
pub enum ScanError {
    /// Txid not found in the chain (or the mempool, when consulted).
    UnknownTransaction,
    /// Output index at or past the transaction's output count.
    OutputIndexOutOfRange,
    /// The output exists but is marked null (pruned in place).
    NullOutput,
    Store(StoreError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::UnknownTransaction => write!(f, "transaction not found"),
            ScanError::OutputIndexOutOfRange => write!(f, "output index out of range"),
            ScanError::NullOutput => write!(f, "output is null"),
            ScanError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<StoreError> for ScanError {
    fn from(err: StoreError) -> Self {
        ScanError::Store(err)
    }
}

/// Mempool lookup capability; the pool itself is an external collaborator.
pub trait MempoolLookup {
    fn transaction(&self, txid: &Hash256) -> Option<Transaction>;
}

/// Details of a still-unspent output.
#[derive(Clone, Debug, PartialEq)]
pub struct UnspentInfo {
    pub best_block: Hash256,
    pub confirmations: i64,
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
    pub version: i32,
    pub coinbase: bool,
    pub coinstake: bool,
}

/// Whether output `vout` of `txid` is unspent as of the best chain.
///
/// `Ok(None)` means "spent" — the documented external contract reports
/// spent outputs as absence, not as an error. Outputs whose containing
/// block is not (yet) on the main chain are unspent by definition with
/// zero confirmations.
pub fn unspent_output<S: BlockStore>(
    index: &ChainIndex,
    store: &S,
    txid: &Hash256,
    vout: u32,
    mempool: Option<&dyn MempoolLookup>,
) -> Result<Option<UnspentInfo>, ScanError> {
    let (tx, containing_block) = match store.locate_transaction(txid)? {
        Some(location) => {
            let block = store
                .block(&location.block_hash)?
                .ok_or(ScanError::UnknownTransaction)?;
            let tx = block
                .vtx
                .get(location.tx_index)
                .cloned()
                .ok_or(ScanError::UnknownTransaction)?;
            (tx, Some(location.block_hash))
        }
        None => match mempool.and_then(|pool| pool.transaction(txid)) {
            Some(tx) => (tx, None),
            None => return Err(ScanError::UnknownTransaction),
        },
    };

    let output = tx
        .vout
        .get(vout as usize)
        .ok_or(ScanError::OutputIndexOutOfRange)?;
    if output.is_null() {
        return Err(ScanError::NullOutput);
    }

    let best = index.best_entry().ok_or(ScanError::UnknownTransaction)?;
    let info = |confirmations: i64| UnspentInfo {
        best_block: best.hash,
        confirmations,
        value: output.value,
        script_pubkey: output.script_pubkey.clone(),
        version: tx.version,
        coinbase: tx.is_coinbase(),
        coinstake: tx.is_coinstake(),
    };

    let Some(block_hash) = containing_block else {
        return Ok(Some(info(0)));
    };
    let Some(entry_id) = index.find_by_hash(&block_hash) else {
        return Ok(Some(info(0)));
    };
    if !index.is_in_main_chain(entry_id) {
        // Not finalized: unspent by definition, no spend scan.
        return Ok(Some(info(0)));
    }

    let mut cursor = index.entry(entry_id).successor;
    while let Some(id) = cursor {
        let entry = index.entry(id);
        let block = store.block(&entry.hash)?.ok_or_else(|| {
            ScanError::Store(StoreError::Backend(format!(
                "missing block body {}",
                hash256_to_hex(&entry.hash)
            )))
        })?;
        for block_tx in &block.vtx {
            for input in &block_tx.vin {
                if input.prevout.hash == *txid && input.prevout.index == vout {
                    ember_log::log_debug!(
                        "output {}:{} spent in block {}",
                        hash256_to_hex(txid),
                        vout,
                        hash256_to_hex(&entry.hash)
                    );
                    return Ok(None);
                }
            }
        }
        cursor = entry.successor;
    }

    let confirmations = best.height - index.entry(entry_id).height + 1;
    Ok(Some(info(confirmations)))
}
