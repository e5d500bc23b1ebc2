//! Per-pool set of staged orders waiting for the next task.
//!
//! Orders are keyed by id, so iteration order never depends on arrival
//! order. Freezing takes the whole set; the pool is immediately ready to
//! collect again.

use std::collections::BTreeMap;

use veilmatch_types::{CommitmentId, PoolId, Result, RevealedOrder, VeilmatchError, constants};

/// Staged orders for one pool.
#[derive(Debug, Clone)]
pub struct PendingPool {
    pool_id: PoolId,
    orders: BTreeMap<CommitmentId, RevealedOrder>,
    /// Maximum number of freshly staged orders.
    max_orders: usize,
}

impl PendingPool {
    #[must_use]
    pub fn new(pool_id: PoolId) -> Self {
        Self::with_capacity(pool_id, constants::DEFAULT_MAX_PENDING_PER_POOL)
    }

    #[must_use]
    pub fn with_capacity(pool_id: PoolId, max_orders: usize) -> Self {
        Self {
            pool_id,
            orders: BTreeMap::new(),
            max_orders,
        }
    }

    /// Stage a freshly validated order.
    ///
    /// # Errors
    /// - `DuplicateCommitment` if the id is already staged
    /// - `PendingSetFull` if the pool is at capacity
    pub fn push(&mut self, order: RevealedOrder) -> Result<()> {
        if self.orders.len() >= self.max_orders {
            return Err(VeilmatchError::PendingSetFull(self.pool_id.clone()));
        }
        self.reinsert(order)
    }

    /// Re-insert an order that was already accepted once (carry-forward or
    /// recycle). Not subject to the capacity bound.
    pub fn reinsert(&mut self, order: RevealedOrder) -> Result<()> {
        if self.orders.contains_key(&order.id) {
            return Err(VeilmatchError::DuplicateCommitment(order.id));
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    /// Take every staged order, in id order.
    pub fn freeze(&mut self) -> Vec<RevealedOrder> {
        std::mem::take(&mut self.orders).into_values().collect()
    }

    pub fn remove(&mut self, id: &CommitmentId) -> Option<RevealedOrder> {
        self.orders.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &CommitmentId) -> bool {
        self.orders.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RevealedOrder> {
        self.orders.values()
    }

    #[must_use]
    pub fn pool_id(&self) -> &PoolId {
        &self.pool_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use veilmatch_types::*;

    use super::*;

    fn order() -> RevealedOrder {
        RevealedOrder::dummy(OrderSide::Buy, Decimal::ONE, Decimal::new(100, 0))
    }

    #[test]
    fn push_and_count() {
        let mut pool = PendingPool::new(PoolId::new("P"));
        pool.push(order()).unwrap();
        pool.push(order()).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_empty());
    }

    #[test]
    fn duplicate_rejected() {
        let mut pool = PendingPool::new(PoolId::new("P"));
        let o = order();
        pool.push(o.clone()).unwrap();
        assert!(matches!(pool.push(o), Err(VeilmatchError::DuplicateCommitment(_))));
    }

    #[test]
    fn capacity_applies_to_fresh_orders_only() {
        let mut pool = PendingPool::with_capacity(PoolId::new("P"), 2);
        pool.push(order()).unwrap();
        pool.push(order()).unwrap();
        assert!(matches!(pool.push(order()), Err(VeilmatchError::PendingSetFull(_))));
        pool.reinsert(order()).unwrap();
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn freeze_takes_everything_in_id_order() {
        let mut pool = PendingPool::new(PoolId::new("P"));
        let a = order();
        let b = order();
        pool.push(b.clone()).unwrap();
        pool.push(a.clone()).unwrap();
        let frozen = pool.freeze();
        assert_eq!(frozen.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert!(pool.is_empty());
        pool.push(order()).unwrap();
    }
}
