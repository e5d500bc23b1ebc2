//! Staked operators as seen through the registry.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OperatorId, PoolId};

/// A registered operator.
///
/// The core reads `stake_weight` for selection and tallying and
/// `public_key` to authenticate votes. `reliability_score` is carried for
/// the registry's own bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub public_key: [u8; 32],
    pub stake_weight: u64,
    pub reliability_score: Decimal,
}

impl Operator {
    /// Operator whose id is its ed25519 public key.
    #[must_use]
    pub fn new(public_key: [u8; 32], stake_weight: u64) -> Self {
        Self {
            id: OperatorId(public_key),
            public_key,
            stake_weight,
            reliability_score: Decimal::ONE,
        }
    }

    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.stake_weight > 0
    }
}

/// Read-only view of a pool's operators, captured once when a task is
/// assigned. Operators are kept sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSnapshot {
    pub pool_id: PoolId,
    operators: Vec<Operator>,
}

impl OperatorSnapshot {
    #[must_use]
    pub fn new(pool_id: PoolId, mut operators: Vec<Operator>) -> Self {
        operators.sort_by_key(|o| o.id);
        operators.dedup_by_key(|o| o.id);
        Self { pool_id, operators }
    }

    #[must_use]
    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    #[must_use]
    pub fn get(&self, id: &OperatorId) -> Option<&Operator> {
        self.operators
            .binary_search_by_key(id, |o| o.id)
            .ok()
            .map(|i| &self.operators[i])
    }

    #[must_use]
    pub fn stake_of(&self, id: &OperatorId) -> u64 {
        self.get(id).map_or(0, |o| o.stake_weight)
    }

    /// Operators with positive stake, in id order.
    pub fn eligible(&self) -> impl Iterator<Item = &Operator> {
        self.operators.iter().filter(|o| o.is_eligible())
    }

    #[must_use]
    pub fn total_stake(&self) -> u64 {
        self.operators.iter().map(|o| o.stake_weight).sum()
    }
}
