//! Block, transaction, and serialization primitives.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod transaction;

pub use block::{Block, BlockHeader, BlockKind};
pub use outpoint::OutPoint;
pub use transaction::{Transaction, TxIn, TxOut};
