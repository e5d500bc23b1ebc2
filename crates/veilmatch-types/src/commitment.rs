//! Order commitments and their lifecycle.
//!
//! A commitment is what the ledger sees: an opaque hash plus an encrypted
//! payload. Everything except `status` is immutable once submitted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, VeilmatchError};
use crate::{CommitmentId, EpochId, PoolId, RevealedPayload, SubmitterId, TaskId};

// ---------------------------------------------------------------------------
// CommitmentStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a commitment.
///
/// ```text
/// Pending ──► Assigned ──► Matched ──► Settled
///    │  ▲        │  │         │
///    │  └────────┘  │         │
///    │  (carry /    ▼         ▼
///    │   recycle)  Disputed ◄─┘
///    ▼              │
/// Expired           └──► Pending (requeue)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum CommitmentStatus {
    Pending,
    Assigned,
    Matched,
    Settled,
    Expired,
    Disputed,
}

impl CommitmentStatus {
    /// Whether `self → next` is an allowed transition.
    #[must_use]
    pub fn can_transition_to(&self, next: CommitmentStatus) -> bool {
        use CommitmentStatus::{Assigned, Disputed, Expired, Matched, Pending, Settled};
        matches!(
            (self, next),
            (Pending, Assigned | Expired | Disputed)
                | (Assigned, Matched | Pending | Disputed)
                | (Matched, Settled | Disputed)
                | (Disputed, Pending)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Expired)
    }
}

impl std::fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Matched => write!(f, "MATCHED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Disputed => write!(f, "DISPUTED"),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderCommitment
// ---------------------------------------------------------------------------

/// A sealed order as posted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCommitment {
    pub id: CommitmentId,
    pub pool_id: PoolId,
    pub commitment_hash: [u8; 32],
    /// `nonce(12) || ciphertext` under the pool's payload key.
    pub encrypted_payload: Vec<u8>,
    pub submitter: SubmitterId,
    pub submission_epoch: EpochId,
    /// Ledger stream sequence for this pool.
    pub sequence: u64,
    pub status: CommitmentStatus,
    pub posted_at: DateTime<Utc>,
}

impl OrderCommitment {
    /// Build a fresh `Pending` commitment for `payload`, hashing it with
    /// [`compute_commitment_hash`]. `encrypted_payload` must be the sealed
    /// form of the same payload.
    #[must_use]
    pub fn new(
        pool_id: PoolId,
        submitter: SubmitterId,
        submission_epoch: EpochId,
        payload: &RevealedPayload,
        encrypted_payload: Vec<u8>,
    ) -> Self {
        let commitment_hash = compute_commitment_hash(&pool_id, &submitter, payload);
        Self {
            id: CommitmentId::new(),
            pool_id,
            commitment_hash,
            encrypted_payload,
            submitter,
            submission_epoch,
            sequence: 0,
            status: CommitmentStatus::Pending,
            posted_at: Utc::now(),
        }
    }

    /// Apply a status transition, refusing anything outside the lifecycle.
    pub fn transition(&mut self, next: CommitmentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(VeilmatchError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

fn update_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// Length-prefixed canonical decimal encoding (`1.50` and `1.5` agree).
pub fn update_decimal(hasher: &mut Sha256, value: Decimal) {
    update_str(hasher, &value.normalize().to_string());
}

/// Commitment hash binding a payload to its pool and submitter.
#[must_use]
pub fn compute_commitment_hash(
    pool_id: &PoolId,
    submitter: &SubmitterId,
    payload: &RevealedPayload,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"veilmatch:commitment:v1:");
    update_str(&mut hasher, pool_id.as_str());
    update_str(&mut hasher, submitter.as_str());
    hasher.update([payload.side.tag()]);
    update_decimal(&mut hasher, payload.amount);
    update_decimal(&mut hasher, payload.limit_price);
    hasher.update(payload.nonce);
    hasher.finalize().into()
}

/// Hash of a partial-fill remainder, bound to its parent and the task that
/// produced it.
#[must_use]
pub fn compute_remainder_hash(parent_hash: &[u8; 32], task_id: &TaskId, remaining: Decimal) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"veilmatch:remainder:v1:");
    hasher.update(parent_hash);
    hasher.update(task_id.as_bytes());
    update_decimal(&mut hasher, remaining);
    hasher.finalize().into()
}
