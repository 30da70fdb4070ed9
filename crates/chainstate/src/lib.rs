//! Consensus-state core: block index, chain-trust selection, synchronized
//! checkpoints, and the read-side scans the query surface is built on.

pub mod checkpoints;
pub mod entry;
pub mod index;
pub mod rates;
pub mod scan;
pub mod state;

pub use entry::{BlockIndexEntry, EntryId, EntryScore};
pub use index::{ChainError, ChainIndex, ReorgOutcome};
pub use state::{BlockVerdict, ChainState, StateError};
