//! Settlement records, proofs, ledger responses and misbehavior evidence.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EpochId, OperatorId, OperatorVote, PoolId, TaskId};

// ---------------------------------------------------------------------------
// Proof
// ---------------------------------------------------------------------------

/// Opaque proof bytes produced by a proving backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Backend that produced the proof (e.g. `attestation-v1`).
    pub scheme: String,
    pub bytes: Vec<u8>,
}

impl Proof {
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What a verifier sees. Never contains order contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicInputs {
    pub task_id: TaskId,
    pub pool_id: PoolId,
    pub epoch: EpochId,
    pub result_hash: [u8; 32],
}

impl PublicInputs {
    /// Canonical byte encoding bound into every proof.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let pool = self.pool_id.as_str().as_bytes();
        let mut buf = Vec::with_capacity(32 + 8 + pool.len() + 8 + 32);
        buf.extend_from_slice(self.task_id.as_bytes());
        buf.extend_from_slice(&(pool.len() as u64).to_le_bytes());
        buf.extend_from_slice(pool);
        buf.extend_from_slice(&self.epoch.0.to_le_bytes());
        buf.extend_from_slice(&self.result_hash);
        buf
    }
}

// ---------------------------------------------------------------------------
// SettlementRecord
// ---------------------------------------------------------------------------

/// Everything the ledger needs to settle a finalized task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub task_id: TaskId,
    pub pool_id: PoolId,
    pub epoch: EpochId,
    pub result_hash: [u8; 32],
    pub proof: Proof,
    /// Votes for `result_hash` from the quorum.
    pub quorum_signatures: Vec<OperatorVote>,
    /// Submission nonce, refreshed on retryable rejections.
    pub nonce: u64,
    pub created_at: DateTime<Utc>,
}

impl SettlementRecord {
    #[must_use]
    pub fn public_inputs(&self) -> PublicInputs {
        PublicInputs {
            task_id: self.task_id,
            pool_id: self.pool_id.clone(),
            epoch: self.epoch,
            result_hash: self.result_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger responses
// ---------------------------------------------------------------------------

/// Why the ledger refused a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerRejection {
    /// The ledger has moved past the record's epoch window. Retryable.
    StaleEpoch,
    /// The submission nonce was already consumed. Retryable.
    NonceReused,
    /// The task was already settled on-ledger.
    DoubleSettlement,
    /// The proof did not verify against the public inputs.
    InvalidProof,
    /// Any other refusal.
    Other(String),
}

impl LedgerRejection {
    /// Retryable rejections are resubmitted with a refreshed nonce.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleEpoch | Self::NonceReused)
    }
}

impl fmt::Display for LedgerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleEpoch => write!(f, "STALE_EPOCH"),
            Self::NonceReused => write!(f, "NONCE_REUSED"),
            Self::DoubleSettlement => write!(f, "DOUBLE_SETTLEMENT"),
            Self::InvalidProof => write!(f, "INVALID_PROOF"),
            Self::Other(reason) => write!(f, "OTHER({reason})"),
        }
    }
}

/// Ledger acknowledgement of an accepted settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub task_id: TaskId,
    pub result_hash: [u8; 32],
    /// Nonce of the accepted submission.
    pub nonce: u64,
    /// Submissions made, including the accepted one.
    pub attempts: u32,
    pub accepted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Misbehavior evidence
// ---------------------------------------------------------------------------

/// What an operator did wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    /// Voted a hash other than the one the quorum finalized.
    DivergentFromQuorum { finalized_hash: [u8; 32] },
    /// Voted against a strict stake majority of a task that still failed.
    DivergentFromMajority { majority_hash: [u8; 32] },
}

/// Evidence handed to the registry's slashing collaborator.
///
/// The signed vote is carried so the evidence can be checked independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisbehaviorEvidence {
    pub task_id: TaskId,
    pub operator_id: OperatorId,
    pub vote: OperatorVote,
    pub kind: EvidenceKind,
}
