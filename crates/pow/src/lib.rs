//! Proof-of-work target math: compact bits, difficulty, and block proof.

pub mod difficulty;
