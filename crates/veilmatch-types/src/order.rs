//! Revealed order types.
//!
//! A [`RevealedOrder`] only exists inside an operator, after intake has
//! decrypted a commitment's payload and checked it hashes back to the
//! posted commitment hash.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commitment::{compute_commitment_hash, compute_remainder_hash};
use crate::{CommitmentId, EpochId, OrderCommitment, PoolId, SubmitterId, TaskId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Single-byte tag used inside hashed encodings.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Buy => 0x01,
            Self::Sell => 0x02,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// RevealedPayload
// ---------------------------------------------------------------------------

/// Plaintext carried inside a commitment's encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedPayload {
    pub side: OrderSide,
    pub amount: Decimal,
    pub limit_price: Decimal,
    /// Blinding nonce chosen by the submitter.
    pub nonce: [u8; 32],
}

// ---------------------------------------------------------------------------
// RevealedOrder
// ---------------------------------------------------------------------------

/// A staged order an operator may match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedOrder {
    /// Id of this order. For a remainder this is a derived id.
    pub id: CommitmentId,
    /// Ledger commitment this order descends from (equal to `id` unless
    /// this is the remainder of a partial fill).
    pub origin: CommitmentId,
    pub pool_id: PoolId,
    pub submitter: SubmitterId,
    pub side: OrderSide,
    pub amount: Decimal,
    pub limit_price: Decimal,
    pub nonce: [u8; 32],
    pub submission_epoch: EpochId,
    /// Hash binding this order. The ledger hash for originals, a derived
    /// hash for remainders.
    pub commitment_hash: [u8; 32],
}

impl RevealedOrder {
    /// Combine a commitment with its decrypted payload.
    ///
    /// Does not check the binding; see [`RevealedOrder::is_bound`].
    #[must_use]
    pub fn from_commitment(commitment: &OrderCommitment, payload: RevealedPayload) -> Self {
        Self {
            id: commitment.id,
            origin: commitment.id,
            pool_id: commitment.pool_id.clone(),
            submitter: commitment.submitter.clone(),
            side: payload.side,
            amount: payload.amount,
            limit_price: payload.limit_price,
            nonce: payload.nonce,
            submission_epoch: commitment.submission_epoch,
            commitment_hash: commitment.commitment_hash,
        }
    }

    /// True if the revealed fields hash back to `commitment_hash`.
    ///
    /// Remainders carry a derived hash, so this is false for them.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        compute_commitment_hash(&self.pool_id, &self.submitter, &self.payload()) == self.commitment_hash
    }

    #[must_use]
    pub fn payload(&self) -> RevealedPayload {
        RevealedPayload {
            side: self.side,
            amount: self.amount,
            limit_price: self.limit_price,
            nonce: self.nonce,
        }
    }

    /// Derive the remainder left after a partial fill inside `task_id`.
    #[must_use]
    pub fn remainder(&self, task_id: &TaskId, remaining: Decimal) -> Self {
        Self {
            id: CommitmentId::remainder(&self.id, task_id),
            origin: self.origin,
            pool_id: self.pool_id.clone(),
            submitter: self.submitter.clone(),
            side: self.side,
            amount: remaining,
            limit_price: self.limit_price,
            nonce: self.nonce,
            submission_epoch: self.submission_epoch,
            commitment_hash: compute_remainder_hash(&self.commitment_hash, task_id, remaining),
        }
    }

    #[must_use]
    pub fn is_remainder(&self) -> bool {
        self.id != self.origin
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl RevealedPayload {
    /// Payload with a random nonce.
    pub fn dummy(side: OrderSide, amount: Decimal, limit_price: Decimal) -> Self {
        Self {
            side,
            amount,
            limit_price,
            nonce: rand::random(),
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl RevealedOrder {
    /// A bound, original order in pool `TEST/USD` from submitter `alice`.
    pub fn dummy(side: OrderSide, amount: Decimal, limit_price: Decimal) -> Self {
        Self::dummy_for(SubmitterId::new("alice"), side, amount, limit_price)
    }

    pub fn dummy_for(
        submitter: SubmitterId,
        side: OrderSide,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Self {
        let pool_id = PoolId::new("TEST/USD");
        let payload = RevealedPayload::dummy(side, amount, limit_price);
        let commitment_hash = compute_commitment_hash(&pool_id, &submitter, &payload);
        let id = CommitmentId::new();
        Self {
            id,
            origin: id,
            pool_id,
            submitter,
            side,
            amount,
            limit_price,
            nonce: payload.nonce,
            submission_epoch: EpochId(0),
            commitment_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_orders_are_bound() {
        let order = RevealedOrder::dummy(OrderSide::Buy, Decimal::new(10, 0), Decimal::new(100, 0));
        assert!(order.is_bound());
        assert!(!order.is_remainder());
    }

    #[test]
    fn tampered_amount_breaks_binding() {
        let mut order = RevealedOrder::dummy(OrderSide::Sell, Decimal::new(10, 0), Decimal::new(95, 0));
        order.amount = Decimal::new(11, 0);
        assert!(!order.is_bound());
    }

    #[test]
    fn trailing_zeros_do_not_change_binding() {
        let mut order = RevealedOrder::dummy(OrderSide::Buy, Decimal::new(10, 0), Decimal::new(100, 0));
        order.amount = Decimal::new(1000, 2);
        assert!(order.is_bound());
    }

    #[test]
    fn remainder_keeps_origin_and_price() {
        let order = RevealedOrder::dummy(OrderSide::Buy, Decimal::new(15, 0), Decimal::new(100, 0));
        let task = TaskId([9; 32]);
        let rem = order.remainder(&task, Decimal::new(5, 0));
        assert!(rem.is_remainder());
        assert_eq!(rem.origin, order.id);
        assert_eq!(rem.limit_price, order.limit_price);
        assert_eq!(rem.amount, Decimal::new(5, 0));
        assert_ne!(rem.commitment_hash, order.commitment_hash);
        assert_eq!(rem, order.remainder(&task, Decimal::new(5, 0)));
    }

    #[test]
    fn side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }
}
