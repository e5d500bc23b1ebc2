//! Settlement submitter.
//!
//! Packages a Finalized task into a [`SettlementRecord`] and drives it onto
//! the ledger. Retryable rejections (stale epoch, nonce reuse) are
//! resubmitted with a refreshed nonce after exponential backoff, as long as
//! the next attempt would start before the task deadline. Anything else, or
//! running out of attempts or time, is a terminal `Ledger`-class error and
//! the caller marks the task's commitments Disputed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use veilmatch_types::{
    LedgerRejection, MatchingTask, OperatorVote, Proof, Result, RetryStrategy, SettlementConfig,
    SettlementReceipt, SettlementRecord, TaskId, TaskPhase, VeilmatchError,
};

use crate::idempotency::IdempotencyGuard;
use crate::ledger::{Ledger, LedgerResponse};

fn mismatch(reason: impl Into<String>) -> VeilmatchError {
    VeilmatchError::RecordMismatch { reason: reason.into() }
}

/// Whether an attempt after `delay` would still start before `deadline`.
fn starts_before(deadline: DateTime<Utc>, delay: Duration) -> bool {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .is_some_and(|start| start < deadline)
}

fn finalized_hash(task: &MatchingTask) -> Result<[u8; 32]> {
    match (task.phase, task.finalized_hash) {
        (TaskPhase::Finalized, Some(hash)) => Ok(hash),
        (phase, _) => Err(VeilmatchError::TaskNotFinalized {
            task: task.task_id,
            phase,
        }),
    }
}

/// Submits settlement records for finalized tasks.
pub struct SettlementSubmitter {
    ledger: Arc<dyn Ledger>,
    guard: Mutex<IdempotencyGuard>,
    max_attempts: u32,
    retry: RetryStrategy,
}

impl SettlementSubmitter {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, config: &SettlementConfig) -> Self {
        Self {
            ledger,
            guard: Mutex::new(IdempotencyGuard::new(config.idempotency_cache.max(1))),
            max_attempts: config.max_attempts.max(1),
            retry: RetryStrategy::from(config),
        }
    }

    /// Package a record for `task`. The nonce is filled in at submission.
    pub fn build_record(task: &MatchingTask, proof: Proof, quorum_signatures: Vec<OperatorVote>) -> Result<SettlementRecord> {
        let record = SettlementRecord {
            task_id: task.task_id,
            pool_id: task.pool_id.clone(),
            epoch: task.epoch,
            result_hash: finalized_hash(task)?,
            proof,
            quorum_signatures,
            nonce: 0,
            created_at: Utc::now(),
        };
        Self::check_record(task, &record)?;
        Ok(record)
    }

    /// Pre-submission checks: task Finalized, record bound to its finalized
    /// values, and at least one quorum signature for that hash.
    pub fn check_record(task: &MatchingTask, record: &SettlementRecord) -> Result<()> {
        let hash = finalized_hash(task)?;
        if record.task_id != task.task_id {
            return Err(mismatch(format!("record task {} != {}", record.task_id, task.task_id)));
        }
        if record.pool_id != task.pool_id || record.epoch != task.epoch {
            return Err(mismatch("record pool or epoch differs from task"));
        }
        if record.result_hash != hash {
            return Err(mismatch(format!(
                "record hash {} != finalized {}",
                hex::encode(record.result_hash),
                hex::encode(hash)
            )));
        }
        if record.quorum_signatures.is_empty() {
            return Err(mismatch("record carries no quorum signatures"));
        }
        if let Some(v) = record
            .quorum_signatures
            .iter()
            .find(|v| v.task_id != task.task_id || v.result_hash != hash || !task.is_assigned_to(&v.operator_id))
        {
            return Err(mismatch(format!("signature from {} does not back the finalized hash", v.operator_id)));
        }
        Ok(())
    }

    /// Submit `record` for `task`, retrying retryable rejections.
    pub async fn submit(&self, task: &MatchingTask, mut record: SettlementRecord) -> Result<SettlementReceipt> {
        Self::check_record(task, &record)?;
        self.guard.lock().await.check(&task.task_id)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            record.nonce = self.ledger.next_nonce(&record.pool_id).await?;

            match self.ledger.submit(&record).await? {
                LedgerResponse::Accepted => {
                    self.guard.lock().await.mark_settled(task.task_id)?;
                    tracing::info!(
                        task = %task.task_id,
                        pool = %task.pool_id,
                        nonce = record.nonce,
                        attempts = attempt,
                        "Settlement accepted"
                    );
                    return Ok(SettlementReceipt {
                        task_id: task.task_id,
                        result_hash: record.result_hash,
                        nonce: record.nonce,
                        attempts: attempt,
                        accepted_at: Utc::now(),
                    });
                }
                LedgerResponse::Rejected(reason) if reason.is_retryable() => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    if attempt >= self.max_attempts || !starts_before(task.deadline, delay) {
                        tracing::error!(task = %task.task_id, reason = %reason, attempts = attempt, "Settlement attempts exhausted");
                        return Err(VeilmatchError::SubmissionAttemptsExhausted {
                            attempts: attempt,
                            last: reason,
                        });
                    }
                    tracing::warn!(
                        task = %task.task_id,
                        reason = %reason,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Settlement rejected, resubmitting"
                    );
                    tokio::time::sleep(delay).await;
                }
                LedgerResponse::Rejected(reason) => {
                    if reason == LedgerRejection::DoubleSettlement {
                        self.guard.lock().await.mark_settled(task.task_id)?;
                    }
                    tracing::error!(task = %task.task_id, reason = %reason, "Settlement rejected");
                    return Err(VeilmatchError::LedgerRejected(reason));
                }
            }
        }
    }

    pub async fn is_settled(&self, task_id: &TaskId) -> bool {
        self.guard.lock().await.is_settled(task_id)
    }

    /// Settled task ids, oldest first, for persistence.
    pub async fn settled_tasks(&self) -> Vec<TaskId> {
        self.guard.lock().await.iter().copied().collect()
    }

    /// Re-seed the guard after a restart.
    pub async fn restore_settled(&self, tasks: impl IntoIterator<Item = TaskId>) {
        let mut guard = self.guard.lock().await;
        for task in tasks {
            if guard.mark_settled(task).is_err() {
                tracing::debug!(task = %task, "Settled task listed twice in snapshot");
            }
        }
    }
}

impl std::fmt::Debug for SettlementSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementSubmitter")
            .field("max_attempts", &self.max_attempts)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
