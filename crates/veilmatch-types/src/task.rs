//! Matching tasks: one frozen batch per pool per epoch.
//!
//! ```text
//! CREATED → ASSIGNED → COLLECTING → FINALIZED
//!    │         │           │
//!    └─────────┴───────────┴──────► FAILED
//! ```
//!
//! The order set is private and never mutated after construction. Any
//! holder can re-check it against `order_set_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ErrorClass, Result, VeilmatchError};
use crate::{CommitmentId, EpochId, OperatorId, PoolId, RevealedOrder, TaskId};

/// Phase of a matching task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskPhase {
    /// Registered with a frozen order set.
    Created,
    /// Committee selected.
    Assigned,
    /// Votes being tallied.
    Collecting,
    /// One result hash reached the stake threshold.
    Finalized,
    /// Deadline, disagreement, proving, or ledger failure.
    Failed,
}

impl TaskPhase {
    #[must_use]
    pub fn can_transition_to(&self, next: TaskPhase) -> bool {
        use TaskPhase::{Assigned, Collecting, Created, Failed, Finalized};
        matches!(
            (self, next),
            (Created, Assigned | Failed)
                | (Assigned, Collecting | Failed)
                | (Collecting, Finalized | Failed)
                // a finalized task can still fail at proving or settlement
                | (Finalized, Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Collecting => write!(f, "COLLECTING"),
            Self::Finalized => write!(f, "FINALIZED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Hash committing to an order set: ids and commitment hashes in id order.
///
/// The input need not be sorted.
#[must_use]
pub fn compute_order_set_hash(task_id: &TaskId, orders: &[RevealedOrder]) -> [u8; 32] {
    let mut refs: Vec<&RevealedOrder> = orders.iter().collect();
    refs.sort_by_key(|o| o.id);

    let mut hasher = Sha256::new();
    hasher.update(b"veilmatch:order_set:v1:");
    hasher.update(task_id.as_bytes());
    hasher.update((refs.len() as u64).to_le_bytes());
    for order in refs {
        hasher.update(order.id.0.as_bytes());
        hasher.update(order.commitment_hash);
    }
    hasher.finalize().into()
}

/// A frozen batch of orders for one pool and epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingTask {
    pub task_id: TaskId,
    pub pool_id: PoolId,
    pub epoch: EpochId,
    order_set: Vec<RevealedOrder>,
    pub order_set_hash: [u8; 32],
    /// Committee in selection order. Empty until `Assigned`.
    pub assigned_operators: Vec<OperatorId>,
    pub deadline: DateTime<Utc>,
    pub phase: TaskPhase,
    /// Result hash the quorum agreed on.
    pub finalized_hash: Option<[u8; 32]>,
    /// Why the task failed, once `Failed`.
    pub failure: Option<ErrorClass>,
    pub created_at: DateTime<Utc>,
}

impl MatchingTask {
    /// Freeze `orders` into a task. The order set is stored sorted by id.
    pub fn new(
        pool_id: PoolId,
        epoch: EpochId,
        mut orders: Vec<RevealedOrder>,
        deadline: DateTime<Utc>,
    ) -> Self {
        let task_id = TaskId::derive(&pool_id, epoch);
        orders.sort_by_key(|o| o.id);
        let order_set_hash = compute_order_set_hash(&task_id, &orders);
        Self {
            task_id,
            pool_id,
            epoch,
            order_set: orders,
            order_set_hash,
            assigned_operators: Vec::new(),
            deadline,
            phase: TaskPhase::Created,
            finalized_hash: None,
            failure: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn orders(&self) -> &[RevealedOrder] {
        &self.order_set
    }

    #[must_use]
    pub fn order_ids(&self) -> Vec<CommitmentId> {
        self.order_set.iter().map(|o| o.id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order_set.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_set.is_empty()
    }

    /// Re-check the frozen order set against `order_set_hash`.
    pub fn verify_order_set(&self) -> Result<()> {
        if compute_order_set_hash(&self.task_id, &self.order_set) == self.order_set_hash {
            Ok(())
        } else {
            Err(VeilmatchError::OrderSetMismatch { task: self.task_id })
        }
    }

    #[must_use]
    pub fn is_assigned_to(&self, operator: &OperatorId) -> bool {
        self.assigned_operators.contains(operator)
    }

    /// The committee member responsible for proving and submitting.
    #[must_use]
    pub fn designated_submitter(&self) -> Option<&OperatorId> {
        self.assigned_operators.first()
    }

    fn advance(&mut self, next: TaskPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(VeilmatchError::InvalidTaskTransition {
                task: self.task_id,
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub fn assign(&mut self, committee: Vec<OperatorId>) -> Result<()> {
        self.advance(TaskPhase::Assigned)?;
        self.assigned_operators = committee;
        Ok(())
    }

    pub fn begin_collecting(&mut self) -> Result<()> {
        self.advance(TaskPhase::Collecting)
    }

    pub fn finalize(&mut self, result_hash: [u8; 32]) -> Result<()> {
        self.advance(TaskPhase::Finalized)?;
        self.finalized_hash = Some(result_hash);
        Ok(())
    }

    pub fn fail(&mut self, class: ErrorClass) -> Result<()> {
        self.advance(TaskPhase::Failed)?;
        self.failure = Some(class);
        Ok(())
    }
}
