//! The canonical book for one task's order set.
//!
//! Bids sit in a `BTreeMap<Reverse<Decimal>, PriceLevel>` (highest first),
//! asks in a `BTreeMap<Decimal, PriceLevel>` (lowest first). Within a level
//! orders sort by commitment hash, so the priority order of the book depends
//! only on the set of orders, never on insertion order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use veilmatch_types::*;

use crate::price_level::PriceLevel;

/// Canonical book built from one frozen order set.
#[derive(Debug)]
pub struct OrderBook {
    pub pool_id: PoolId,
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    seen: HashSet<CommitmentId>,
}

impl OrderBook {
    #[must_use]
    pub fn new(pool_id: PoolId) -> Self {
        Self {
            pool_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Build a book from an unordered set of orders.
    pub fn from_orders(pool_id: PoolId, orders: impl IntoIterator<Item = RevealedOrder>) -> Result<Self> {
        let mut book = Self::new(pool_id);
        for order in orders {
            book.insert_order(order)?;
        }
        Ok(book)
    }

    /// Place an order at its level. A commitment id can only appear once.
    pub fn insert_order(&mut self, order: RevealedOrder) -> Result<()> {
        if !self.seen.insert(order.id) {
            return Err(VeilmatchError::DuplicateCommitment(order.id));
        }
        let price = order.limit_price;
        let level = match order.side {
            OrderSide::Buy => self.bids.entry(Reverse(price)).or_insert_with(|| PriceLevel::new(price)),
            OrderSide::Sell => self.asks.entry(price).or_insert_with(|| PriceLevel::new(price)),
        };
        level.insert(order);
        Ok(())
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Whether the best bid reaches the best ask, i.e. at least one pair can trade.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.seen.len()
    }

    /// Bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Consume the book into `(bids, asks)`, each in full priority order.
    #[must_use]
    pub fn into_priority_queues(self) -> (Vec<RevealedOrder>, Vec<RevealedOrder>) {
        let bids = self.bids.into_values().flat_map(|level| level.orders).collect();
        let asks = self.asks.into_values().flat_map(|level| level.orders).collect();
        (bids, asks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(side: OrderSide, price: i64, amount: i64) -> RevealedOrder {
        RevealedOrder::dummy(side, Decimal::new(amount, 0), Decimal::new(price, 0))
    }

    fn book() -> OrderBook {
        OrderBook::new(PoolId::new("TEST/USD"))
    }

    #[test]
    fn best_prices_and_cross() {
        let mut book = book();
        book.insert_order(order(OrderSide::Buy, 100, 1)).unwrap();
        book.insert_order(order(OrderSide::Buy, 101, 1)).unwrap();
        book.insert_order(order(OrderSide::Sell, 103, 1)).unwrap();
        book.insert_order(order(OrderSide::Sell, 102, 1)).unwrap();

        assert_eq!(book.best_bid(), Some(Decimal::new(101, 0)));
        assert_eq!(book.best_ask(), Some(Decimal::new(102, 0)));
        assert!(!book.is_crossed());
        assert_eq!(book.order_count(), 4);

        book.insert_order(order(OrderSide::Buy, 102, 1)).unwrap();
        assert!(book.is_crossed(), "equal limits cross");
    }

    #[test]
    fn one_sided_book_never_crosses() {
        let mut book = book();
        book.insert_order(order(OrderSide::Buy, 100, 1)).unwrap();
        book.insert_order(order(OrderSide::Buy, 90, 1)).unwrap();
        assert!(!book.is_crossed());
    }

    #[test]
    fn duplicate_commitment_rejected() {
        let mut book = book();
        let o = order(OrderSide::Buy, 100, 1);
        book.insert_order(o.clone()).unwrap();
        assert!(matches!(book.insert_order(o), Err(VeilmatchError::DuplicateCommitment(_))));
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn levels_iterate_best_first() {
        let mut book = book();
        for price in [99, 101, 100] {
            book.insert_order(order(OrderSide::Buy, price, 1)).unwrap();
            book.insert_order(order(OrderSide::Sell, price + 5, 1)).unwrap();
        }
        let bids: Vec<Decimal> = book.bid_levels().map(|l| l.price).collect();
        let asks: Vec<Decimal> = book.ask_levels().map(|l| l.price).collect();
        assert_eq!(bids, vec![Decimal::new(101, 0), Decimal::new(100, 0), Decimal::new(99, 0)]);
        assert_eq!(asks, vec![Decimal::new(104, 0), Decimal::new(105, 0), Decimal::new(106, 0)]);
    }

    #[test]
    fn priority_queues_ignore_insertion_order() {
        let orders: Vec<RevealedOrder> = vec![
            order(OrderSide::Buy, 100, 1),
            order(OrderSide::Buy, 100, 2),
            order(OrderSide::Buy, 101, 3),
            order(OrderSide::Sell, 99, 1),
            order(OrderSide::Sell, 99, 2),
        ];
        let mut reversed = orders.clone();
        reversed.reverse();

        let a = OrderBook::from_orders(PoolId::new("P"), orders).unwrap().into_priority_queues();
        let b = OrderBook::from_orders(PoolId::new("P"), reversed).unwrap().into_priority_queues();
        assert_eq!(a, b);
        assert_eq!(a.0[0].limit_price, Decimal::new(101, 0));
    }
}
