//! Matching results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CommitmentId, RevealedOrder, TaskId};

/// One crossing of a buy against a sell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub buy_order: CommitmentId,
    pub sell_order: CommitmentId,
    pub amount: Decimal,
    pub clearing_price: Decimal,
}

impl MatchedPair {
    /// Quote-currency value of the pair, `None` if it overflows.
    #[must_use]
    pub fn notional(&self) -> Option<Decimal> {
        self.amount.checked_mul(self.clearing_price)
    }
}

/// Output of matching one task's order set.
///
/// `unmatched_orders` holds every order left over in canonical order:
/// untouched originals and freshly derived remainders alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub task_id: TaskId,
    pub matched_pairs: Vec<MatchedPair>,
    pub unmatched_orders: Vec<RevealedOrder>,
    pub result_hash: [u8; 32],
}

impl MatchResult {
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.matched_pairs.len()
    }

    /// Base amount crossed across all pairs, `None` if it overflows.
    #[must_use]
    pub fn total_matched(&self) -> Option<Decimal> {
        self.matched_pairs
            .iter()
            .try_fold(Decimal::ZERO, |total, p| total.checked_add(p.amount))
    }

    /// Quote value crossed across all pairs, `None` if it overflows.
    #[must_use]
    pub fn total_notional(&self) -> Option<Decimal> {
        self.matched_pairs
            .iter()
            .try_fold(Decimal::ZERO, |total, p| total.checked_add(p.notional()?))
    }

    #[must_use]
    pub fn result_hash_hex(&self) -> String {
        hex::encode(self.result_hash)
    }

    /// Remainders produced by partial fills in this result.
    pub fn remainders(&self) -> impl Iterator<Item = &RevealedOrder> {
        self.unmatched_orders.iter().filter(|o| o.is_remainder())
    }

    /// True if `id` appears on either side of any pair.
    #[must_use]
    pub fn touches(&self, id: &CommitmentId) -> bool {
        self.matched_pairs
            .iter()
            .any(|p| p.buy_order == *id || p.sell_order == *id)
    }
}
