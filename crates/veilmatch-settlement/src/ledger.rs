//! Ledger port: the external settlement layer.

use async_trait::async_trait;
use veilmatch_types::{CommitmentId, CommitmentStatus, LedgerRejection, PoolId, Result, SettlementRecord, TaskId};

/// Ledger answer to a settlement submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerResponse {
    Accepted,
    Rejected(LedgerRejection),
}

/// Settlement layer shared by all operators.
///
/// `Err` means the ledger could not be reached; a reached ledger answers
/// with a [`LedgerResponse`].
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Nonce to use for the next submission on `pool`.
    async fn next_nonce(&self, pool: &PoolId) -> Result<u64>;

    /// Submit a settlement record.
    async fn submit(&self, record: &SettlementRecord) -> Result<LedgerResponse>;

    /// Publish a commitment status change.
    async fn update_status(&self, commitment: &CommitmentId, status: CommitmentStatus) -> Result<()>;

    /// Result hash of the accepted settlement for `task`, if any.
    ///
    /// Lets operators that did not submit learn how a task ended.
    async fn settled_hash(&self, task: &TaskId) -> Result<Option<[u8; 32]>>;
}
