//! Pure deterministic batch matcher.
//!
//! ```text
//! match_order_set(TaskId, &[RevealedOrder], &PoolConfig) -> MatchResult
//! ```
//!
//! ## Algorithm
//!
//! 1. Build the canonical book: buys by descending limit then ascending
//!    commitment hash, sells by ascending limit then ascending hash
//! 2. Walk buys in priority order; each buy crosses sells in priority
//!    order while `buy.limit >= sell.limit`
//! 3. Every crossing clears at [`compute_clearing_price`]
//! 4. A partially filled order leaves a remainder with a derived id
//! 5. Hash the pairs and leftovers into `result_hash`
//!
//! ## Self-cross prevention
//!
//! When the pool forbids it, a buy skips sells from its own submitter and
//! continues with the next sell. The skipped sell stays available to
//! later buys.

use rust_decimal::Decimal;
use veilmatch_types::{
    MatchResult, MatchedPair, MatchingTask, PoolConfig, RevealedOrder, TaskId, constants,
};

use crate::{OrderBook, clearing::compute_clearing_price, determinism::compute_result_hash};

/// Match a task's frozen order set.
#[must_use]
pub fn match_task(task: &MatchingTask, pool: &PoolConfig) -> MatchResult {
    match_order_set(&task.task_id, task.orders(), pool)
}

/// Pure deterministic matching over an unordered set of orders.
///
/// ## Determinism Guarantee
///
/// The result depends only on the *set* of orders, the task id and the
/// pool parameters. Any permutation of `orders` yields the same result
/// and the same `result_hash` on every operator.
#[must_use]
pub fn match_order_set(task_id: &TaskId, orders: &[RevealedOrder], pool: &PoolConfig) -> MatchResult {
    let mut book = OrderBook::new(pool.pool_id.clone());
    for order in orders {
        if let Err(err) = book.insert_order(order.clone()) {
            // sealed order sets are deduplicated, so this only drops a repeat
            tracing::debug!(task = %task_id, error = %err, "Skipping order");
        }
    }

    if book.order_count() < constants::MIN_ORDERS_PER_TASK || !book.is_crossed() {
        let (bids, asks) = book.into_priority_queues();
        let unmatched: Vec<RevealedOrder> = bids.into_iter().chain(asks).collect();
        return finish(task_id, Vec::new(), unmatched);
    }

    let (bids, asks) = book.into_priority_queues();
    let mut bid_left: Vec<Decimal> = bids.iter().map(|o| o.amount).collect();
    let mut ask_left: Vec<Decimal> = asks.iter().map(|o| o.amount).collect();
    let mut pairs: Vec<MatchedPair> = Vec::new();

    for (bi, bid) in bids.iter().enumerate() {
        for (ai, ask) in asks.iter().enumerate() {
            if bid_left[bi] <= Decimal::ZERO {
                break;
            }
            if ask.limit_price > bid.limit_price {
                // asks are sorted ascending, nothing further crosses
                break;
            }
            if ask_left[ai] <= Decimal::ZERO {
                continue;
            }
            if !pool.allow_self_cross && ask.submitter == bid.submitter {
                continue;
            }

            let amount = bid_left[bi].min(ask_left[ai]);
            pairs.push(MatchedPair {
                buy_order: bid.id,
                sell_order: ask.id,
                amount,
                clearing_price: compute_clearing_price(bid.limit_price, ask.limit_price, pool.tick_size),
            });
            bid_left[bi] -= amount;
            ask_left[ai] -= amount;
        }
    }

    let mut unmatched = Vec::new();
    for (order, left) in bids.iter().zip(&bid_left).chain(asks.iter().zip(&ask_left)) {
        if *left <= Decimal::ZERO {
            continue;
        }
        if *left == order.amount {
            unmatched.push(order.clone());
        } else {
            unmatched.push(order.remainder(task_id, *left));
        }
    }

    finish(task_id, pairs, unmatched)
}

fn finish(task_id: &TaskId, pairs: Vec<MatchedPair>, unmatched: Vec<RevealedOrder>) -> MatchResult {
    let result_hash = compute_result_hash(task_id, &pairs, &unmatched);

    tracing::info!(
        task = %task_id,
        pairs = pairs.len(),
        unmatched = unmatched.len(),
        result_hash = hex::encode(result_hash),
        "Task matching complete"
    );

    MatchResult {
        task_id: *task_id,
        matched_pairs: pairs,
        unmatched_orders: unmatched,
        result_hash,
    }
}
