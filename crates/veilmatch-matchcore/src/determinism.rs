//! Result hashing for cross-operator agreement.
//!
//! Operators never exchange full results, only the `result_hash`. Two
//! honest operators matching the same order set must produce identical
//! hashes, so everything here depends only on the result's content and
//! every decimal is normalized before hashing.

use sha2::{Digest, Sha256};
use veilmatch_types::{MatchResult, MatchedPair, RevealedOrder, TaskId, update_decimal};

/// Hash a result's pairs (in match order) and unmatched orders (in the
/// order given, which the matcher makes canonical).
#[must_use]
pub fn compute_result_hash(
    task_id: &TaskId,
    pairs: &[MatchedPair],
    unmatched: &[RevealedOrder],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"veilmatch:result:v1:");
    hasher.update(task_id.as_bytes());

    hasher.update((pairs.len() as u64).to_le_bytes());
    for pair in pairs {
        hasher.update(pair.buy_order.0.as_bytes());
        hasher.update(pair.sell_order.0.as_bytes());
        update_decimal(&mut hasher, pair.amount);
        update_decimal(&mut hasher, pair.clearing_price);
    }

    hasher.update((unmatched.len() as u64).to_le_bytes());
    for order in unmatched {
        hasher.update(order.id.0.as_bytes());
        update_decimal(&mut hasher, order.amount);
    }

    hasher.finalize().into()
}

/// Recompute a result's hash and compare it with the claimed one.
#[must_use]
pub fn verify_result_hash(result: &MatchResult) -> bool {
    compute_result_hash(&result.task_id, &result.matched_pairs, &result.unmatched_orders)
        == result.result_hash
}
