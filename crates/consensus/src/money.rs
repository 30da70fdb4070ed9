//! Monetary units and money range rules.

pub type Amount = i64;

pub const COIN: Amount = 100_000_000;
pub const CENT: Amount = 1_000_000;

/// No amount larger than this (in base units) is valid.
pub const MAX_MONEY: Amount = 2_000_000_000 * COIN;

pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Render an amount the way the RPC layer does: whole coins with eight
/// fractional digits.
pub fn amount_to_value(value: Amount) -> f64 {
    value as f64 / COIN as f64
}
