//! Error types for VeilMatch operators.
//!
//! All errors use the `VM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Intake errors
//! - 2xx: Commitment lifecycle errors
//! - 3xx: Task / epoch errors
//! - 4xx: Matching errors
//! - 5xx: Quorum errors
//! - 6xx: Proof errors
//! - 7xx: Settlement / ledger errors
//! - 8xx: Network errors
//! - 9xx: General / internal errors
//!
//! Independently of the code, every error maps onto an [`ErrorClass`] which
//! decides how the pipeline reacts (dispute, recycle, retry, report).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CommitmentId, CommitmentStatus, LedgerRejection, OperatorId, PoolId, TaskId, TaskPhase};

// ---------------------------------------------------------------------------
// RejectReason
// ---------------------------------------------------------------------------

/// Why intake refused to stage a commitment.
///
/// Every reason is a validation failure: the commitment is marked
/// `Disputed` and reported upstream, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Decrypted payload does not hash back to the posted commitment.
    HashMismatch,
    /// Commitment names a pool this operator does not serve.
    UnknownPool,
    /// Amount or limit price is not strictly positive, or below the pool minimum.
    InvalidAmount,
    /// Submission epoch is in the future or older than the pool's age window.
    Expired,
    /// Payload could not be decrypted or decoded.
    Malformed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HashMismatch => write!(f, "HASH_MISMATCH"),
            Self::UnknownPool => write!(f, "UNKNOWN_POOL"),
            Self::InvalidAmount => write!(f, "INVALID_AMOUNT"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Malformed => write!(f, "MALFORMED"),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

/// Pipeline-level error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Bad hash or malformed input. Disputed, never auto-retried.
    Validation,
    /// Deadline passed. Task failed, orders recycled.
    Timing,
    /// No quorum. Task failed, divergent operators reported.
    Agreement,
    /// Proving failed after bounded retries. Handled like `Timing`.
    Proof,
    /// Ledger refused the settlement.
    Ledger,
    /// Local bug or environment failure.
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Timing => write!(f, "TIMING"),
            Self::Agreement => write!(f, "AGREEMENT"),
            Self::Proof => write!(f, "PROOF"),
            Self::Ledger => write!(f, "LEDGER"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

// ---------------------------------------------------------------------------
// VeilmatchError
// ---------------------------------------------------------------------------

/// Central error enum for all VeilMatch operations.
#[derive(Debug, Error)]
pub enum VeilmatchError {
    // =================================================================
    // Intake Errors (1xx)
    // =================================================================
    /// The commitment failed validation and must be disputed.
    #[error("VM_ERR_100: Commitment {id} rejected: {reason}")]
    Rejected { id: CommitmentId, reason: RejectReason },

    /// The commitment is already staged or was already seen.
    #[error("VM_ERR_101: Commitment already staged: {0}")]
    DuplicateCommitment(CommitmentId),

    /// The pool's pending set is at capacity.
    #[error("VM_ERR_102: Pending set full for pool {0}")]
    PendingSetFull(PoolId),

    /// The commitment is unknown to this operator.
    #[error("VM_ERR_103: Commitment not found: {0}")]
    CommitmentNotFound(CommitmentId),

    // =================================================================
    // Lifecycle Errors (2xx)
    // =================================================================
    /// A commitment status change outside the allowed lifecycle.
    #[error("VM_ERR_200: Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: CommitmentId,
        from: CommitmentStatus,
        to: CommitmentStatus,
    },

    // =================================================================
    // Task / Epoch Errors (3xx)
    // =================================================================
    /// The task's frozen order set no longer matches its recorded hash.
    #[error("VM_ERR_302: Order set hash mismatch for {task}")]
    OrderSetMismatch { task: TaskId },

    /// A task phase change outside the task state machine.
    #[error("VM_ERR_303: Invalid task transition for {task}: {from} -> {to}")]
    InvalidTaskTransition {
        task: TaskId,
        from: TaskPhase,
        to: TaskPhase,
    },

    /// The task deadline (plus grace) passed.
    #[error("VM_ERR_304: Deadline expired for {0}")]
    DeadlineExpired(TaskId),

    // =================================================================
    // Matching Errors (4xx)
    // =================================================================
    /// A result hash did not recompute to the claimed value.
    #[error("VM_ERR_401: Determinism violation: expected {expected}, got {actual}")]
    DeterminismViolation { expected: String, actual: String },

    /// Matched amounts do not balance against the input orders.
    #[error("VM_ERR_402: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    // =================================================================
    // Quorum Errors (5xx)
    // =================================================================
    /// A vote arrived from an operator outside the task's committee.
    #[error("VM_ERR_500: Operator {operator} is not assigned to {task}")]
    NotAssigned { operator: OperatorId, task: TaskId },

    /// The operator already voted on this task.
    #[error("VM_ERR_501: Duplicate vote from {operator} on {task}")]
    DuplicateVote { operator: OperatorId, task: TaskId },

    /// The vote signature does not verify under the operator's key.
    #[error("VM_ERR_502: Invalid vote signature from {0}")]
    InvalidVoteSignature(OperatorId),

    /// A vote names a different task than the tally it was sent to.
    #[error("VM_ERR_503: Vote for {actual} delivered to tally of {expected}")]
    WrongTask { expected: TaskId, actual: TaskId },

    /// No result hash reached the stake threshold.
    #[error("VM_ERR_504: Quorum not reached for {task}: best {best_weight} of {assigned_weight}")]
    QuorumNotReached {
        task: TaskId,
        best_weight: u128,
        assigned_weight: u128,
    },

    /// The registry snapshot has no operator with positive stake.
    #[error("VM_ERR_505: No eligible operators for pool {0}")]
    NoEligibleOperators(PoolId),

    /// The tally already produced its outcome.
    #[error("VM_ERR_506: Tally closed for {0}")]
    TallyClosed(TaskId),

    // =================================================================
    // Proof Errors (6xx)
    // =================================================================
    /// The proving backend refused or failed a single attempt.
    #[error("VM_ERR_600: Proof generation failed: {reason}")]
    ProofGeneration { reason: String },

    /// A single proving attempt exceeded its time budget.
    #[error("VM_ERR_601: Proof attempt {attempt} timed out")]
    ProofTimeout { attempt: u32 },

    /// All proving attempts failed.
    #[error("VM_ERR_602: Proof failed after {attempts} attempts: {last}")]
    ProofAttemptsExhausted { attempts: u32, last: String },

    /// Proving was cancelled (task resolved elsewhere or deadline passed).
    #[error("VM_ERR_603: Proof generation cancelled for {0}")]
    ProofCancelled(TaskId),

    // =================================================================
    // Settlement Errors (7xx)
    // =================================================================
    /// Settlement is only ever submitted for finalized tasks.
    #[error("VM_ERR_700: Task {task} is {phase}, not FINALIZED")]
    TaskNotFinalized { task: TaskId, phase: TaskPhase },

    /// The settlement record disagrees with the finalized task.
    #[error("VM_ERR_701: Settlement record mismatch: {reason}")]
    RecordMismatch { reason: String },

    /// The task was already submitted (idempotency guard).
    #[error("VM_ERR_702: Task already settled: {0}")]
    AlreadySettled(TaskId),

    /// The ledger refused the settlement terminally.
    #[error("VM_ERR_703: Ledger rejected settlement: {0}")]
    LedgerRejected(LedgerRejection),

    /// Retryable rejections persisted past the attempt budget.
    #[error("VM_ERR_704: Settlement gave up after {attempts} attempts, last rejection: {last}")]
    SubmissionAttemptsExhausted { attempts: u32, last: LedgerRejection },

    // =================================================================
    // Network Errors (8xx)
    // =================================================================
    /// Vote transport failure.
    #[error("VM_ERR_800: Transport error: {reason}")]
    Transport { reason: String },

    /// An internal channel closed before delivering.
    #[error("VM_ERR_801: Channel closed: {0}")]
    ChannelClosed(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("VM_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("VM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("VM_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("VM_ERR_903: I/O error: {0}")]
    Io(String),

    /// Key material or signature encoding error.
    #[error("VM_ERR_904: Crypto error: {0}")]
    Crypto(String),
}

impl VeilmatchError {
    /// Map the error onto the pipeline taxonomy.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Rejected { .. }
            | Self::DuplicateCommitment(_)
            | Self::PendingSetFull(_)
            | Self::OrderSetMismatch { .. }
            | Self::NotAssigned { .. }
            | Self::DuplicateVote { .. }
            | Self::InvalidVoteSignature(_)
            | Self::WrongTask { .. } => ErrorClass::Validation,

            Self::DeadlineExpired(_) => ErrorClass::Timing,

            Self::DeterminismViolation { .. }
            | Self::QuorumNotReached { .. }
            | Self::NoEligibleOperators(_)
            | Self::TaskNotFinalized { .. }
            | Self::RecordMismatch { .. } => ErrorClass::Agreement,

            Self::ProofGeneration { .. }
            | Self::ProofTimeout { .. }
            | Self::ProofAttemptsExhausted { .. }
            | Self::ProofCancelled(_) => ErrorClass::Proof,

            Self::AlreadySettled(_)
            | Self::LedgerRejected(_)
            | Self::SubmissionAttemptsExhausted { .. } => ErrorClass::Ledger,

            Self::CommitmentNotFound(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidTaskTransition { .. }
            | Self::ConservationViolation { .. }
            | Self::TallyClosed(_)
            | Self::Transport { .. }
            | Self::ChannelClosed(_)
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_)
            | Self::Crypto(_) => ErrorClass::Internal,
        }
    }

    /// The intake rejection reason, if this is a rejection.
    #[must_use]
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, VeilmatchError>;

impl From<std::io::Error> for VeilmatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VeilmatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
