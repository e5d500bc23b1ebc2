//! Operator registry port.

use async_trait::async_trait;
use veilmatch_types::{
    MisbehaviorEvidence, Operator, OperatorId, OperatorSnapshot, PoolId, Result, TaskId, VeilmatchError,
};

/// Source of operator stake and sink for misbehavior reports.
///
/// Implementations sit outside the operator (on-chain registry, admin API).
/// Reports are evidence only; slashing is decided elsewhere.
#[async_trait]
pub trait OperatorRegistry: Send + Sync {
    /// Operators currently registered for `pool`.
    async fn get_operators(&self, pool: &PoolId) -> Result<Vec<Operator>>;

    /// Publish evidence that an operator voted against the outcome.
    async fn report_misbehavior(
        &self,
        operator: &OperatorId,
        task: &TaskId,
        evidence: MisbehaviorEvidence,
    ) -> Result<()>;
}

/// Fetch and freeze the operator set for `pool`.
///
/// Fails with `NoEligibleOperators` when nobody has stake.
pub async fn snapshot_operators(registry: &dyn OperatorRegistry, pool: &PoolId) -> Result<OperatorSnapshot> {
    let snapshot = OperatorSnapshot::new(pool.clone(), registry.get_operators(pool).await?);
    if snapshot.eligible().next().is_none() {
        return Err(VeilmatchError::NoEligibleOperators(pool.clone()));
    }
    Ok(snapshot)
}
