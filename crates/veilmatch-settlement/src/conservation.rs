//! Conservation checker for a match result against its input orders.
//!
//! Invariant, per input order `o`:
//! ```text
//! amount(o) == Σ fills(o) + leftover(o)
//! ```
//! where `leftover(o)` is `o` itself when untouched, or the single remainder
//! derived from `o` for this task. Per side, the filled totals must agree,
//! and every fill price must lie between the sell limit and the buy limit.
//!
//! A result that breaks any of these creates or destroys size and must
//! never be proven or settled.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use veilmatch_types::{CommitmentId, MatchResult, OrderSide, Result, RevealedOrder, VeilmatchError};

fn violation(reason: String) -> VeilmatchError {
    VeilmatchError::ConservationViolation { reason }
}

fn add(total: Decimal, amount: Decimal) -> Result<Decimal> {
    total
        .checked_add(amount)
        .ok_or_else(|| violation(format!("fill total overflows at {total} + {amount}")))
}

/// Input orders of one task, indexed for checking its result.
pub struct ConservationCheck<'a> {
    orders: BTreeMap<CommitmentId, &'a RevealedOrder>,
}

impl<'a> ConservationCheck<'a> {
    #[must_use]
    pub fn new(orders: &'a [RevealedOrder]) -> Self {
        Self {
            orders: orders.iter().map(|o| (o.id, o)).collect(),
        }
    }

    /// Verify `result` against the input orders.
    pub fn verify(&self, result: &MatchResult) -> Result<()> {
        let mut filled: HashMap<CommitmentId, Decimal> = HashMap::new();
        let mut buy_total = Decimal::ZERO;
        let mut sell_total = Decimal::ZERO;

        for pair in &result.matched_pairs {
            let buy = self.side_order(&pair.buy_order, OrderSide::Buy)?;
            let sell = self.side_order(&pair.sell_order, OrderSide::Sell)?;
            if pair.amount <= Decimal::ZERO {
                return Err(violation(format!("non-positive fill {} for {}", pair.amount, buy.id)));
            }
            if pair.clearing_price < sell.limit_price || pair.clearing_price > buy.limit_price {
                return Err(violation(format!(
                    "price {} outside [{}, {}]",
                    pair.clearing_price, sell.limit_price, buy.limit_price
                )));
            }
            for id in [buy.id, sell.id] {
                let fill = filled.entry(id).or_default();
                *fill = add(*fill, pair.amount)?;
            }
            buy_total = add(buy_total, pair.amount)?;
            sell_total = add(sell_total, pair.amount)?;
        }
        if buy_total != sell_total {
            return Err(violation(format!("buy fills {buy_total} != sell fills {sell_total}")));
        }

        // leftover per input order: untouched original or derived remainder
        let remainder_parent: HashMap<CommitmentId, CommitmentId> = self
            .orders
            .keys()
            .map(|id| (CommitmentId::remainder(id, &result.task_id), *id))
            .collect();
        let mut leftover: HashMap<CommitmentId, Decimal> = HashMap::new();
        for order in &result.unmatched_orders {
            let parent_id = if self.orders.contains_key(&order.id) {
                order.id
            } else if let Some(parent) = remainder_parent.get(&order.id) {
                *parent
            } else {
                return Err(violation(format!("unmatched order {} has no input", order.id)));
            };
            let parent = self.orders[&parent_id];
            if order.side != parent.side || order.limit_price != parent.limit_price {
                return Err(violation(format!("leftover {} altered side or price", order.id)));
            }
            if leftover.insert(parent_id, order.amount).is_some() {
                return Err(violation(format!("order {parent_id} left over twice")));
            }
        }

        for (id, order) in &self.orders {
            let fill = filled.get(id).copied().unwrap_or_default();
            let left = leftover.get(id).copied().unwrap_or_default();
            if add(fill, left)? != order.amount {
                return Err(violation(format!(
                    "order {id}: filled {fill} + leftover {left} != amount {}",
                    order.amount
                )));
            }
        }
        Ok(())
    }

    fn side_order(&self, id: &CommitmentId, side: OrderSide) -> Result<&'a RevealedOrder> {
        let order = self
            .orders
            .get(id)
            .copied()
            .ok_or_else(|| violation(format!("pair references unknown order {id}")))?;
        if order.side != side {
            return Err(violation(format!("order {id} is {} but sits on the {side} leg", order.side)));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use veilmatch_types::*;

    use super::*;

    fn d(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn honest() -> (Vec<RevealedOrder>, MatchResult) {
        let buy = RevealedOrder::dummy(OrderSide::Buy, d(15), d(100));
        let sell = RevealedOrder::dummy(OrderSide::Sell, d(10), d(100));
        let task_id = TaskId([4; 32]);
        let result = MatchResult {
            task_id,
            matched_pairs: vec![MatchedPair {
                buy_order: buy.id,
                sell_order: sell.id,
                amount: d(10),
                clearing_price: d(100),
            }],
            unmatched_orders: vec![buy.remainder(&task_id, d(5))],
            result_hash: [0; 32],
        };
        (vec![buy, sell], result)
    }

    #[test]
    fn honest_partial_fill_passes() {
        let (orders, result) = honest();
        ConservationCheck::new(&orders).verify(&result).unwrap();
    }

    #[test]
    fn missing_remainder_fails() {
        let (orders, mut result) = honest();
        result.unmatched_orders.clear();
        let err = ConservationCheck::new(&orders).verify(&result).unwrap_err();
        assert!(matches!(err, VeilmatchError::ConservationViolation { .. }));
    }

    #[test]
    fn inflated_remainder_fails() {
        let (orders, mut result) = honest();
        result.unmatched_orders[0].amount = d(6);
        assert!(ConservationCheck::new(&orders).verify(&result).is_err());
    }

    #[test]
    fn price_outside_limits_fails() {
        let (orders, mut result) = honest();
        result.matched_pairs[0].clearing_price = d(101);
        assert!(ConservationCheck::new(&orders).verify(&result).is_err());
    }

    #[test]
    fn swapped_legs_fail() {
        let (orders, mut result) = honest();
        let p = &mut result.matched_pairs[0];
        std::mem::swap(&mut p.buy_order, &mut p.sell_order);
        assert!(ConservationCheck::new(&orders).verify(&result).is_err());
    }

    #[test]
    fn overflowing_fill_totals_fail_instead_of_panicking() {
        let (orders, mut result) = honest();
        let pair = result.matched_pairs[0].clone();
        result.matched_pairs[0].amount = Decimal::MAX;
        result.matched_pairs.push(pair);
        let err = ConservationCheck::new(&orders).verify(&result).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");
    }

    #[test]
    fn unknown_leftover_fails() {
        let (orders, mut result) = honest();
        result
            .unmatched_orders
            .push(RevealedOrder::dummy(OrderSide::Sell, d(1), d(1)));
        assert!(ConservationCheck::new(&orders).verify(&result).is_err());
    }

    #[test]
    fn untouched_orders_carry_in_full() {
        let buy = RevealedOrder::dummy(OrderSide::Buy, d(10), d(90));
        let sell = RevealedOrder::dummy(OrderSide::Sell, d(10), d(95));
        let result = MatchResult {
            task_id: TaskId([1; 32]),
            matched_pairs: vec![],
            unmatched_orders: vec![buy.clone(), sell.clone()],
            result_hash: [0; 32],
        };
        ConservationCheck::new(&[buy, sell]).verify(&result).unwrap();
    }
}
