//! System-wide constants for VeilMatch operators.

/// Default epoch length in milliseconds.
pub const DEFAULT_EPOCH_MS: u64 = 12_000;

/// Default time budget for one matching task (vote collection + proving).
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 8_000;

/// Grace window added to a task deadline before it is declared expired.
pub const DEFAULT_DEADLINE_GRACE_MS: u64 = 500;

/// Default number of operators assigned to a matching task.
pub const DEFAULT_COMMITTEE_SIZE: usize = 5;

/// Default quorum threshold numerator (two thirds of assigned stake).
pub const DEFAULT_THRESHOLD_NUM: u64 = 2;

/// Default quorum threshold denominator.
pub const DEFAULT_THRESHOLD_DEN: u64 = 3;

/// Default maximum proof generation attempts per task.
pub const DEFAULT_PROOF_ATTEMPTS: u32 = 3;

/// Default per-attempt proving timeout in milliseconds.
pub const DEFAULT_PROOF_ATTEMPT_TIMEOUT_MS: u64 = 2_000;

/// Default initial proving backoff in milliseconds.
pub const DEFAULT_PROOF_BACKOFF_MS: u64 = 100;

/// Upper bound on the proving backoff in milliseconds.
pub const DEFAULT_PROOF_MAX_BACKOFF_MS: u64 = 1_600;

/// Default maximum settlement submission attempts.
pub const DEFAULT_SETTLEMENT_ATTEMPTS: u32 = 4;

/// Default initial settlement resubmission backoff in milliseconds.
pub const DEFAULT_SETTLEMENT_BACKOFF_MS: u64 = 200;

/// Upper bound on the settlement resubmission backoff in milliseconds.
pub const DEFAULT_SETTLEMENT_MAX_BACKOFF_MS: u64 = 3_200;

/// Number of settled task ids remembered by the submission guard.
pub const SETTLEMENT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Maximum staged orders per pool before intake refuses new ones.
pub const DEFAULT_MAX_PENDING_PER_POOL: usize = 10_000;

/// Default ceiling on an order's limit price, in whole quote units.
pub const DEFAULT_MAX_PRICE: i64 = 1_000_000_000_000;

/// Default ceiling on an order's amount, in whole base units.
pub const DEFAULT_MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Commitments older than this many epochs are rejected as expired.
pub const DEFAULT_MAX_ORDER_AGE_EPOCHS: u64 = 300;

/// Minimum number of orders required to create a matching task.
pub const MIN_ORDERS_PER_TASK: usize = 2;

/// AES-GCM nonce length prefixed to every encrypted payload.
pub const PAYLOAD_NONCE_LEN: usize = 12;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "VeilMatch";
