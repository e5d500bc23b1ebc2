//! Commitment feed port.

use async_trait::async_trait;
use veilmatch_types::{OrderCommitment, PoolId, Result};

/// Read side of the commitment store.
///
/// Each pool's commitments carry strictly increasing `sequence` numbers.
/// Intake remembers the last sequence it consumed per pool and asks for
/// everything after it.
#[async_trait]
pub trait CommitmentFeed: Send + Sync {
    /// Commitments in `pool` with `sequence > after`, ascending.
    async fn fetch_since(&self, pool: &PoolId, after: u64) -> Result<Vec<OrderCommitment>>;
}
