//! Orders resting at one limit price.
//!
//! There is no time priority: within a level orders are ranked by
//! commitment hash (then id), which every operator computes identically.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use veilmatch_types::RevealedOrder;

#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Front = highest priority.
    pub orders: VecDeque<RevealedOrder>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, order: RevealedOrder) {
        let key = (order.commitment_hash, order.id);
        let pos = self.orders.partition_point(|o| (o.commitment_hash, o.id) < key);
        self.orders.insert(pos, order);
    }

    /// Size resting at this price.
    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        self.orders.iter().map(|o| o.amount).sum()
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
