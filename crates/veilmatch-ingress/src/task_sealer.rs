//! Task sealer: freezes a pending set into a `MatchingTask`.
//!
//! The sealer gives every task the same deadline budget and refuses to
//! create a task for fewer than two orders. The task id and order set
//! hash are pure functions of `(pool, epoch, orders)`, so every operator
//! that staged the same commitments seals an identical task.

use chrono::{DateTime, Duration, Utc};
use veilmatch_types::{EpochId, MatchingTask, PoolId, RevealedOrder, constants};

/// Seals pending orders into immutable matching tasks.
#[derive(Debug, Clone)]
pub struct TaskSealer {
    /// Time from creation to deadline.
    task_timeout: Duration,
}

impl TaskSealer {
    #[must_use]
    pub fn new(task_timeout: std::time::Duration) -> Self {
        Self {
            task_timeout: Duration::from_std(task_timeout).unwrap_or_else(|_| Duration::days(365)),
        }
    }

    /// Seal `orders` into a task due at `now + task_timeout`.
    ///
    /// Hands the orders back untouched when there are fewer than two.
    pub fn seal(
        &self,
        pool_id: PoolId,
        epoch: EpochId,
        orders: Vec<RevealedOrder>,
        now: DateTime<Utc>,
    ) -> Result<MatchingTask, Vec<RevealedOrder>> {
        if orders.len() < constants::MIN_ORDERS_PER_TASK {
            return Err(orders);
        }
        let deadline = now.checked_add_signed(self.task_timeout).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let task = MatchingTask::new(pool_id, epoch, orders, deadline);

        tracing::info!(
            task = %task.task_id,
            pool = %task.pool_id,
            epoch = task.epoch.0,
            orders = task.len(),
            order_set_hash = hex::encode(task.order_set_hash),
            "Task sealed"
        );
        Ok(task)
    }

    /// Whether a task's frozen order set still matches its hash.
    #[must_use]
    pub fn verify(task: &MatchingTask) -> bool {
        task.verify_order_set().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use veilmatch_types::*;

    use super::*;

    fn sealer() -> TaskSealer {
        TaskSealer::new(std::time::Duration::from_secs(8))
    }

    fn orders(n: usize) -> Vec<RevealedOrder> {
        (0..n)
            .map(|_| RevealedOrder::dummy(OrderSide::Buy, Decimal::ONE, Decimal::new(100, 0)))
            .collect()
    }

    #[test]
    fn refuses_fewer_than_two_orders() {
        let back = sealer().seal(PoolId::new("P"), EpochId(1), orders(1), Utc::now()).unwrap_err();
        assert_eq!(back.len(), 1);
        assert!(sealer().seal(PoolId::new("P"), EpochId(1), vec![], Utc::now()).is_err());
    }

    #[test]
    fn deadline_is_now_plus_timeout() {
        let now = Utc::now();
        let task = sealer().seal(PoolId::new("P"), EpochId(1), orders(2), now).unwrap();
        assert_eq!(task.deadline, now + Duration::seconds(8));
        assert_eq!(task.phase, TaskPhase::Created);
        assert!(TaskSealer::verify(&task));
    }

    #[test]
    fn independent_sealers_agree() {
        let o = orders(5);
        let mut shuffled = o.clone();
        shuffled.reverse();
        let now = Utc::now();
        let a = sealer().seal(PoolId::new("P"), EpochId(9), o, now).unwrap();
        let b = sealer().seal(PoolId::new("P"), EpochId(9), shuffled, now).unwrap();
        assert_eq!(a.task_id, b.task_id);
        assert_eq!(a.order_set_hash, b.order_set_hash);
        assert_eq!(a.order_ids(), b.order_ids());
    }
}
