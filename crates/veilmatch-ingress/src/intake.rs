//! Order intake: validation and staging of commitments.
//!
//! `stage` checks, in order:
//!
//! 1. the commitment was not staged before
//! 2. the pool is served by this operator (`UnknownPool`)
//! 3. `submission_epoch <= current` and within the pool's age window (`Expired`)
//! 4. the payload decrypts and decodes (`Malformed`)
//! 5. the payload hashes back to the commitment hash (`HashMismatch`)
//! 6. amount and limit price are positive and within the pool's bounds (`InvalidAmount`)
//!
//! and then pushes the revealed order into the pool's pending set.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use veilmatch_types::{
    CommitmentId, EpochId, OrderCommitment, PoolConfig, PoolId, RejectReason, Result,
    RevealedOrder, VeilmatchError,
};

use crate::{PayloadCipher, PendingPool};

/// Per-pool intake state.
#[derive(Debug)]
struct PoolState {
    config: PoolConfig,
    pending: PendingPool,
    /// Last ledger sequence consumed from this pool's feed.
    cursor: u64,
}

/// What happened to orders handed back by a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarryOutcome {
    /// Re-staged for the next epoch.
    pub carried: Vec<CommitmentId>,
    /// Dropped from the pending set for exceeding the pool's age window.
    pub expired: Vec<CommitmentId>,
}

/// Validates commitments and keeps per-pool pending sets.
pub struct OrderIntake {
    cipher: Arc<dyn PayloadCipher>,
    pools: BTreeMap<PoolId, PoolState>,
    current_epoch: EpochId,
    /// Commitments ever handled (staged or rejected), to refuse replays.
    seen: HashSet<CommitmentId>,
}

impl OrderIntake {
    #[must_use]
    pub fn new(cipher: Arc<dyn PayloadCipher>, pools: Vec<PoolConfig>, current_epoch: EpochId) -> Self {
        let pools = pools
            .into_iter()
            .map(|config| {
                let pending = PendingPool::with_capacity(config.pool_id.clone(), config.max_pending);
                (
                    config.pool_id.clone(),
                    PoolState {
                        config,
                        pending,
                        cursor: 0,
                    },
                )
            })
            .collect();
        Self {
            cipher,
            pools,
            current_epoch,
            seen: HashSet::new(),
        }
    }

    // =================================================================
    // Epoch
    // =================================================================

    #[must_use]
    pub fn current_epoch(&self) -> EpochId {
        self.current_epoch
    }

    /// Move to `epoch`. Epochs never go backwards.
    pub fn set_epoch(&mut self, epoch: EpochId) {
        if epoch > self.current_epoch {
            self.current_epoch = epoch;
        }
    }

    // =================================================================
    // Staging
    // =================================================================

    /// Validate a commitment and stage its revealed order.
    ///
    /// # Errors
    /// - `Rejected` with the reason; the caller must mark the commitment `Disputed`
    /// - `DuplicateCommitment` if the commitment was already handled
    /// - `PendingSetFull` if the pool cannot take more orders this epoch
    pub fn stage(&mut self, commitment: &OrderCommitment) -> Result<RevealedOrder> {
        if self.seen.contains(&commitment.id) {
            return Err(VeilmatchError::DuplicateCommitment(commitment.id));
        }

        let order = match self.validate(commitment) {
            Ok(order) => order,
            Err(err) => {
                if let Some(reason) = err.reject_reason() {
                    self.seen.insert(commitment.id);
                    tracing::warn!(
                        commitment = %commitment.id,
                        pool = %commitment.pool_id,
                        %reason,
                        "Commitment rejected"
                    );
                }
                return Err(err);
            }
        };

        let state = self
            .pools
            .get_mut(&commitment.pool_id)
            .ok_or_else(|| VeilmatchError::Internal(format!("pool {} vanished", commitment.pool_id)))?;
        state.pending.push(order.clone())?;
        self.seen.insert(commitment.id);

        tracing::debug!(
            commitment = %commitment.id,
            pool = %commitment.pool_id,
            pending = state.pending.len(),
            "Commitment staged"
        );
        Ok(order)
    }

    /// Run every check without staging.
    pub fn validate(&self, commitment: &OrderCommitment) -> Result<RevealedOrder> {
        let reject = |reason| VeilmatchError::Rejected {
            id: commitment.id,
            reason,
        };

        let state = self
            .pools
            .get(&commitment.pool_id)
            .ok_or_else(|| reject(RejectReason::UnknownPool))?;
        let config = &state.config;

        if commitment.submission_epoch > self.current_epoch
            || self.current_epoch.since(commitment.submission_epoch) > config.max_order_age_epochs
        {
            return Err(reject(RejectReason::Expired));
        }

        let payload = self
            .cipher
            .open_payload(&commitment.encrypted_payload)
            .map_err(|_| reject(RejectReason::Malformed))?;

        let order = RevealedOrder::from_commitment(commitment, payload);
        if !order.is_bound() {
            return Err(reject(RejectReason::HashMismatch));
        }

        if order.amount <= Decimal::ZERO
            || order.limit_price <= Decimal::ZERO
            || order.amount < config.min_amount
            || order.amount > config.max_amount
            || order.limit_price > config.max_price
        {
            return Err(reject(RejectReason::InvalidAmount));
        }

        Ok(order)
    }

    // =================================================================
    // Freezing and carry-forward
    // =================================================================

    /// Take a pool's whole pending set for sealing.
    pub fn freeze(&mut self, pool_id: &PoolId) -> Vec<RevealedOrder> {
        self.pools
            .get_mut(pool_id)
            .map(|s| s.pending.freeze())
            .unwrap_or_default()
    }

    /// Re-stage orders handed back by a task: leftovers of a finalized task
    /// (including remainders) or the whole order set of a failed one. No
    /// re-decryption. Orders past the pool's age window are expired instead.
    pub fn carry_forward(&mut self, pool_id: &PoolId, orders: Vec<RevealedOrder>) -> Result<CarryOutcome> {
        let epoch = self.current_epoch;
        let state = self
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| VeilmatchError::Configuration(format!("unknown pool {pool_id}")))?;

        let mut outcome = CarryOutcome::default();
        for order in orders {
            if epoch.since(order.submission_epoch) > state.config.max_order_age_epochs {
                outcome.expired.push(order.id);
                continue;
            }
            let id = order.id;
            match state.pending.reinsert(order) {
                Ok(()) => outcome.carried.push(id),
                // already staged again (e.g. replayed recycle): nothing to do
                Err(VeilmatchError::DuplicateCommitment(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if !outcome.expired.is_empty() {
            tracing::info!(pool = %pool_id, expired = outcome.expired.len(), "Expired aged orders");
        }
        Ok(outcome)
    }

    // =================================================================
    // Feed cursors
    // =================================================================

    #[must_use]
    pub fn cursor(&self, pool_id: &PoolId) -> u64 {
        self.pools.get(pool_id).map_or(0, |s| s.cursor)
    }

    /// Record that `sequence` was consumed. Cursors only move forward.
    pub fn advance_cursor(&mut self, pool_id: &PoolId, sequence: u64) {
        if let Some(state) = self.pools.get_mut(pool_id) {
            state.cursor = state.cursor.max(sequence);
        }
    }

    #[must_use]
    pub fn cursors(&self) -> BTreeMap<PoolId, u64> {
        self.pools.iter().map(|(id, s)| (id.clone(), s.cursor)).collect()
    }

    // =================================================================
    // Queries / persistence
    // =================================================================

    #[must_use]
    pub fn pool_config(&self, pool_id: &PoolId) -> Option<&PoolConfig> {
        self.pools.get(pool_id).map(|s| &s.config)
    }

    pub fn pool_ids(&self) -> impl Iterator<Item = &PoolId> {
        self.pools.keys()
    }

    #[must_use]
    pub fn pending_len(&self, pool_id: &PoolId) -> usize {
        self.pools.get(pool_id).map_or(0, |s| s.pending.len())
    }

    #[must_use]
    pub fn pending_snapshot(&self) -> BTreeMap<PoolId, Vec<RevealedOrder>> {
        self.pools
            .iter()
            .map(|(id, s)| (id.clone(), s.pending.iter().cloned().collect()))
            .collect()
    }

    /// Reload pending sets and cursors after a restart.
    pub fn restore(
        &mut self,
        pending: BTreeMap<PoolId, Vec<RevealedOrder>>,
        cursors: &BTreeMap<PoolId, u64>,
    ) -> Result<()> {
        for (pool_id, orders) in pending {
            let Some(state) = self.pools.get_mut(&pool_id) else {
                tracing::warn!(pool = %pool_id, orders = orders.len(), "Dropping pending set of unserved pool");
                continue;
            };
            for order in orders {
                self.seen.insert(order.origin);
                state.pending.reinsert(order)?;
            }
        }
        for (pool_id, seq) in cursors {
            self.advance_cursor(pool_id, *seq);
        }
        Ok(())
    }
}

impl std::fmt::Debug for OrderIntake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderIntake")
            .field("pools", &self.pools.keys().collect::<Vec<_>>())
            .field("current_epoch", &self.current_epoch)
            .field("seen", &self.seen.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use veilmatch_types::*;

    use super::*;
    use crate::AesGcmCipher;

    const KEY: [u8; 32] = [42; 32];

    fn intake() -> OrderIntake {
        let mut pool = PoolConfig::new("WETH/USDC");
        pool.min_amount = Decimal::new(1, 1);
        pool.max_order_age_epochs = 10;
        OrderIntake::new(Arc::new(AesGcmCipher::new(&KEY)), vec![pool], EpochId(20))
    }

    fn commit(side: OrderSide, amount: Decimal, price: Decimal) -> OrderCommitment {
        let payload = RevealedPayload::dummy(side, amount, price);
        let sealed = AesGcmCipher::new(&KEY).seal_payload(&payload).unwrap();
        OrderCommitment::new(
            PoolId::new("WETH/USDC"),
            SubmitterId::new("0xabc"),
            EpochId(20),
            &payload,
            sealed,
        )
    }

    fn reason(err: &VeilmatchError) -> RejectReason {
        err.reject_reason().expect("expected a rejection")
    }

    #[test]
    fn stages_valid_commitment() {
        let mut intake = intake();
        let c = commit(OrderSide::Buy, Decimal::new(10, 0), Decimal::new(100, 0));
        let order = intake.stage(&c).unwrap();
        assert_eq!(order.id, c.id);
        assert_eq!(order.amount, Decimal::new(10, 0));
        assert_eq!(intake.pending_len(&PoolId::new("WETH/USDC")), 1);
    }

    #[test]
    fn rejects_hash_mismatch() {
        let mut intake = intake();
        let mut c = commit(OrderSide::Buy, Decimal::new(10, 0), Decimal::new(100, 0));
        c.commitment_hash[0] ^= 0xff;
        let err = intake.stage(&c).unwrap_err();
        assert_eq!(reason(&err), RejectReason::HashMismatch);
        assert_eq!(intake.pending_len(&PoolId::new("WETH/USDC")), 0);
    }

    #[test]
    fn rejects_unknown_pool() {
        let mut intake = intake();
        let mut c = commit(OrderSide::Buy, Decimal::new(10, 0), Decimal::new(100, 0));
        c.pool_id = PoolId::new("DOGE/USDC");
        assert_eq!(reason(&intake.stage(&c).unwrap_err()), RejectReason::UnknownPool);
    }

    #[test]
    fn rejects_non_positive_and_dust_amounts() {
        let mut intake = intake();
        for (amount, price) in [
            (Decimal::ZERO, Decimal::new(100, 0)),
            (Decimal::new(-1, 0), Decimal::new(100, 0)),
            (Decimal::new(10, 0), Decimal::ZERO),
            (Decimal::new(1, 2), Decimal::new(100, 0)),
        ] {
            let c = commit(OrderSide::Sell, amount, price);
            assert_eq!(reason(&intake.stage(&c).unwrap_err()), RejectReason::InvalidAmount);
        }
    }

    #[test]
    fn rejects_orders_beyond_pool_bounds() {
        let mut intake = intake();
        for (amount, price) in [
            (Decimal::new(10, 0), Decimal::MAX - Decimal::ONE),
            (Decimal::MAX, Decimal::new(100, 0)),
            (Decimal::new(10, 0), Decimal::from(constants::DEFAULT_MAX_PRICE) + Decimal::ONE),
        ] {
            let c = commit(OrderSide::Buy, amount, price);
            assert_eq!(reason(&intake.stage(&c).unwrap_err()), RejectReason::InvalidAmount);
        }
        assert_eq!(intake.pending_len(&PoolId::new("WETH/USDC")), 0);

        let at_cap = commit(OrderSide::Buy, Decimal::ONE, Decimal::from(constants::DEFAULT_MAX_PRICE));
        intake.stage(&at_cap).unwrap();
    }

    #[test]
    fn rejects_future_and_aged_epochs() {
        let mut intake = intake();
        let mut future = commit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        future.submission_epoch = EpochId(21);
        assert_eq!(reason(&intake.stage(&future).unwrap_err()), RejectReason::Expired);

        let mut old = commit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        old.submission_epoch = EpochId(9);
        assert_eq!(reason(&intake.stage(&old).unwrap_err()), RejectReason::Expired);

        let mut edge = commit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        edge.submission_epoch = EpochId(10);
        // the payload hash does not cover the epoch, so this stays bound
        intake.stage(&edge).unwrap();
    }

    #[test]
    fn rejects_malformed_payload() {
        let mut intake = intake();
        let mut c = commit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        c.encrypted_payload = vec![1, 2, 3];
        assert_eq!(reason(&intake.stage(&c).unwrap_err()), RejectReason::Malformed);
    }

    #[test]
    fn refuses_replays() {
        let mut intake = intake();
        let c = commit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        intake.stage(&c).unwrap();
        intake.freeze(&PoolId::new("WETH/USDC"));
        assert!(matches!(
            intake.stage(&c),
            Err(VeilmatchError::DuplicateCommitment(_))
        ));
    }

    #[test]
    fn carry_forward_expires_aged_orders() {
        let mut intake = intake();
        let pool = PoolId::new("WETH/USDC");
        let mut fresh = RevealedOrder::dummy(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        fresh.submission_epoch = EpochId(18);
        let mut stale = RevealedOrder::dummy(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        stale.submission_epoch = EpochId(2);

        let outcome = intake.carry_forward(&pool, vec![fresh.clone(), stale.clone()]).unwrap();
        assert_eq!(outcome.carried, vec![fresh.id]);
        assert_eq!(outcome.expired, vec![stale.id]);
        assert_eq!(intake.pending_len(&pool), 1);
    }

    #[test]
    fn cursors_only_move_forward() {
        let mut intake = intake();
        let pool = PoolId::new("WETH/USDC");
        intake.advance_cursor(&pool, 5);
        intake.advance_cursor(&pool, 3);
        assert_eq!(intake.cursor(&pool), 5);
    }

    #[test]
    fn restore_roundtrip() {
        let mut a = intake();
        let c = commit(OrderSide::Buy, Decimal::ONE, Decimal::ONE);
        a.stage(&c).unwrap();
        a.advance_cursor(&c.pool_id, 7);

        let mut b = intake();
        b.restore(a.pending_snapshot(), &a.cursors()).unwrap();
        assert_eq!(b.pending_len(&c.pool_id), 1);
        assert_eq!(b.cursor(&c.pool_id), 7);
        assert!(matches!(b.stage(&c), Err(VeilmatchError::DuplicateCommitment(_))));
    }
}
