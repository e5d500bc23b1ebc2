//! Deterministic stake-weighted committee selection.
//!
//! Every operator computes the same committee from the same task id and
//! registry snapshot. Draw `i` hashes `(task_id, i)`, reduces the first
//! eight bytes modulo the remaining stake, and walks the cumulative stake of
//! the not-yet-selected operators in id order. Selected operators leave the
//! pool, so nobody is drawn twice. Zero-stake operators are never drawn.

use sha2::{Digest, Sha256};
use veilmatch_types::{OperatorId, OperatorSnapshot, TaskId};

fn draw(task_id: &TaskId, counter: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"veilmatch:committee:v1:");
    hasher.update(task_id.as_bytes());
    hasher.update(counter.to_le_bytes());
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word)
}

/// Pick up to `size` operators for `task_id`, in selection order.
///
/// If fewer than `size` operators have stake, all of them are returned
/// (still in draw order).
#[must_use]
pub fn select_committee(task_id: &TaskId, snapshot: &OperatorSnapshot, size: usize) -> Vec<OperatorId> {
    let mut pool: Vec<(OperatorId, u64)> = snapshot
        .eligible()
        .map(|o| (o.id, o.stake_weight))
        .collect();
    let mut remaining: u128 = pool.iter().map(|(_, s)| u128::from(*s)).sum();

    let mut committee = Vec::with_capacity(size.min(pool.len()));
    let mut counter = 0u64;
    while committee.len() < size && !pool.is_empty() {
        let target = u128::from(draw(task_id, counter)) % remaining;
        counter += 1;

        let mut acc = 0u128;
        let idx = pool
            .iter()
            .position(|(_, stake)| {
                acc += u128::from(*stake);
                target < acc
            })
            .unwrap_or(pool.len() - 1);

        let (id, stake) = pool.remove(idx);
        remaining -= u128::from(stake);
        committee.push(id);
    }

    tracing::debug!(
        task = %task_id,
        pool = %snapshot.pool_id,
        committee = committee.len(),
        "Committee selected"
    );
    committee
}
