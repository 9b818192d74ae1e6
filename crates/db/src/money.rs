// crates/db/src/money.rs
//! Monetary column encoding.
//!
//! SQLite has no decimal type, so cost columns store INTEGER
//! ten-thousandths of a USD. Accumulation in SQL is then exact integer
//! addition; `Decimal` appears only at the crate boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const SCALE: u32 = 4;

/// USD decimal → raw column value. The input is expected to already be
/// rounded to 4 fractional digits; anything beyond is rounded half-even
/// here as a backstop.
pub fn cost_to_raw(cost: Decimal) -> i64 {
    (cost * Decimal::from(10_i64.pow(SCALE)))
        .round()
        .to_i64()
        .unwrap_or(0)
}

/// Raw column value → USD decimal with 4 fractional digits.
pub fn cost_from_raw(raw: i64) -> Decimal {
    Decimal::new(raw, SCALE)
}
