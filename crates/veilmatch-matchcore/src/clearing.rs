//! Clearing price rule.
//!
//! Every crossing clears at the midpoint of the bid and ask limit prices,
//! rounded down to the pool's tick size. If flooring would push the price
//! below the ask, the ask itself is used so neither limit is violated.
//! The midpoint is taken as `ask + (bid - ask) / 2`, which stays inside
//! `[ask, bid]` and cannot overflow for any pair of positive limits.

use rust_decimal::Decimal;

/// Clearing price for a bid crossing an ask (`bid >= ask`).
///
/// A non-positive `tick` disables rounding.
#[must_use]
pub fn compute_clearing_price(bid: Decimal, ask: Decimal, tick: Decimal) -> Decimal {
    debug_assert!(bid >= ask, "clearing requires a crossing: bid {bid} < ask {ask}");
    let mid = ask + (bid - ask) / Decimal::TWO;
    if tick <= Decimal::ZERO {
        return mid.normalize();
    }
    // a tick far below the price can push mid / tick out of range
    match mid.checked_div(tick).and_then(|steps| steps.floor().checked_mul(tick)) {
        Some(floored) => floored.max(ask).normalize(),
        None => mid.normalize(),
    }
}
