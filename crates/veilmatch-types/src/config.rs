//! Configuration types for VeilMatch operator nodes and pools.
//!
//! Loaded from TOML, then overridden from `VEILMATCH_*` environment
//! variables, then validated.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VeilmatchError};
use crate::{constants, PoolId};

/// Configuration for a single operator node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Path to the data directory (state snapshot, keys).
    pub data_dir: String,
    /// File holding this operator's ed25519 secret key (hex).
    pub key_file: String,
    /// Hex-encoded 32-byte AES-256-GCM key that opens commitment payloads.
    pub payload_key: String,
    #[serde(default)]
    pub epoch: EpochConfig,
    #[serde(default)]
    pub quorum: QuorumConfig,
    #[serde(default)]
    pub proof: ProofConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Pools served by this node.
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            key_file: "./data/operator.key".to_string(),
            payload_key: "00".repeat(32),
            epoch: EpochConfig::default(),
            quorum: QuorumConfig::default(),
            proof: ProofConfig::default(),
            settlement: SettlementConfig::default(),
            pools: vec![PoolConfig::new("WETH/USDC")],
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VeilmatchError::Configuration(e.to_string()))
    }

    /// Load from a TOML file, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VeilmatchError::Serialization(e.to_string()))
    }

    /// Apply `VEILMATCH_DATA_DIR`, `VEILMATCH_KEY_FILE`,
    /// `VEILMATCH_PAYLOAD_KEY` and `VEILMATCH_COMMITTEE_SIZE`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("VEILMATCH_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Ok(path) = std::env::var("VEILMATCH_KEY_FILE") {
            self.key_file = path;
        }
        if let Ok(key) = std::env::var("VEILMATCH_PAYLOAD_KEY") {
            self.payload_key = key;
        }
        if let Ok(size) = std::env::var("VEILMATCH_COMMITTEE_SIZE") {
            self.quorum.committee_size = size.parse().map_err(|_| {
                VeilmatchError::Configuration(format!("VEILMATCH_COMMITTEE_SIZE is not a number: {size}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(VeilmatchError::Configuration(msg));

        if self.data_dir.is_empty() {
            return fail("data_dir is required".into());
        }
        if self.payload_key_bytes().is_none() {
            return fail("payload_key must be 64 hex characters".into());
        }
        if self.epoch.epoch_ms == 0 || self.epoch.task_timeout_ms == 0 {
            return fail("epoch and task timeouts must be positive".into());
        }
        if self.quorum.committee_size == 0 {
            return fail("committee_size must be at least 1".into());
        }
        let q = &self.quorum;
        if q.threshold_den == 0 || q.threshold_num == 0 || q.threshold_num > q.threshold_den {
            return fail(format!(
                "threshold {}/{} must be in (0, 1]",
                q.threshold_num, q.threshold_den
            ));
        }
        if self.proof.max_attempts == 0 || self.settlement.max_attempts == 0 {
            return fail("attempt budgets must be at least 1".into());
        }
        if self.proof.backoff_ms > self.proof.max_backoff_ms
            || self.settlement.backoff_ms > self.settlement.max_backoff_ms
        {
            return fail("initial backoff exceeds its cap".into());
        }
        // leftovers are resolved at the next epoch start, which must come
        // after the deadline, its grace and one last settlement backoff
        let resolve_after = self
            .epoch
            .task_timeout_ms
            .saturating_add(self.epoch.deadline_grace_ms)
            .saturating_add(self.settlement.max_backoff_ms);
        if self.epoch.epoch_ms <= resolve_after {
            return fail(format!(
                "epoch_ms {} must exceed task timeout + grace + settlement max backoff ({resolve_after})",
                self.epoch.epoch_ms
            ));
        }
        if self.pools.is_empty() {
            return fail("at least one pool is required".into());
        }
        let mut seen = std::collections::HashSet::new();
        for pool in &self.pools {
            pool.validate()?;
            if !seen.insert(&pool.pool_id) {
                return fail(format!("pool {} configured twice", pool.pool_id));
            }
        }
        Ok(())
    }

    /// Decoded payload key, if well-formed.
    #[must_use]
    pub fn payload_key_bytes(&self) -> Option<[u8; 32]> {
        hex::decode(&self.payload_key).ok()?.try_into().ok()
    }

    #[must_use]
    pub fn pool(&self, id: &PoolId) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| &p.pool_id == id)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Epoch timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Length of one epoch.
    pub epoch_ms: u64,
    /// Budget for one task from creation to deadline.
    pub task_timeout_ms: u64,
    /// Slack added to a deadline before the task is declared expired.
    pub deadline_grace_ms: u64,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            epoch_ms: constants::DEFAULT_EPOCH_MS,
            task_timeout_ms: constants::DEFAULT_TASK_TIMEOUT_MS,
            deadline_grace_ms: constants::DEFAULT_DEADLINE_GRACE_MS,
        }
    }
}

impl EpochConfig {
    #[must_use]
    pub fn epoch(&self) -> Duration {
        Duration::from_millis(self.epoch_ms)
    }

    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.deadline_grace_ms)
    }
}

/// Committee selection and threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    pub committee_size: usize,
    pub threshold_num: u64,
    pub threshold_den: u64,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            committee_size: constants::DEFAULT_COMMITTEE_SIZE,
            threshold_num: constants::DEFAULT_THRESHOLD_NUM,
            threshold_den: constants::DEFAULT_THRESHOLD_DEN,
        }
    }
}

/// Proving retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_PROOF_ATTEMPTS,
            attempt_timeout_ms: constants::DEFAULT_PROOF_ATTEMPT_TIMEOUT_MS,
            backoff_ms: constants::DEFAULT_PROOF_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_PROOF_MAX_BACKOFF_MS,
        }
    }
}

/// Settlement resubmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Settled task ids remembered by the duplicate-submission guard.
    pub idempotency_cache: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_SETTLEMENT_ATTEMPTS,
            backoff_ms: constants::DEFAULT_SETTLEMENT_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_SETTLEMENT_MAX_BACKOFF_MS,
            idempotency_cache: constants::SETTLEMENT_IDEMPOTENCY_CACHE_SIZE,
        }
    }
}

/// Per-pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub pool_id: PoolId,
    /// Price granularity. Clearing prices are floored to a multiple of this.
    pub tick_size: Decimal,
    /// Smallest acceptable order amount.
    pub min_amount: Decimal,
    /// Largest acceptable order amount.
    #[serde(default = "default_max_amount")]
    pub max_amount: Decimal,
    /// Largest acceptable limit price.
    #[serde(default = "default_max_price")]
    pub max_price: Decimal,
    /// Maximum staged orders.
    pub max_pending: usize,
    /// Commitments older than this many epochs are expired.
    pub max_order_age_epochs: u64,
    /// Whether a submitter's buy may cross their own sell.
    pub allow_self_cross: bool,
}

fn default_max_amount() -> Decimal {
    Decimal::from(constants::DEFAULT_MAX_AMOUNT)
}

fn default_max_price() -> Decimal {
    Decimal::from(constants::DEFAULT_MAX_PRICE)
}

impl PoolConfig {
    /// A pool with tick 1, no minimum and self-crossing allowed.
    #[must_use]
    pub fn new(pool_id: impl Into<String>) -> Self {
        Self {
            pool_id: PoolId::new(pool_id),
            tick_size: Decimal::ONE,
            min_amount: Decimal::ZERO,
            max_amount: default_max_amount(),
            max_price: default_max_price(),
            max_pending: constants::DEFAULT_MAX_PENDING_PER_POOL,
            max_order_age_epochs: constants::DEFAULT_MAX_ORDER_AGE_EPOCHS,
            allow_self_cross: true,
        }
    }

    #[must_use]
    pub fn forbid_self_cross(mut self) -> Self {
        self.allow_self_cross = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_id.as_str().is_empty() {
            return Err(VeilmatchError::Configuration("pool_id is required".into()));
        }
        if self.tick_size <= Decimal::ZERO {
            return Err(VeilmatchError::Configuration(format!(
                "pool {}: tick_size must be positive",
                self.pool_id
            )));
        }
        if self.min_amount < Decimal::ZERO {
            return Err(VeilmatchError::Configuration(format!(
                "pool {}: min_amount must not be negative",
                self.pool_id
            )));
        }
        if self.max_pending < constants::MIN_ORDERS_PER_TASK {
            return Err(VeilmatchError::Configuration(format!(
                "pool {}: max_pending below task minimum",
                self.pool_id
            )));
        }
        if self.max_amount <= Decimal::ZERO || self.max_amount < self.min_amount || self.max_price < self.tick_size {
            return Err(VeilmatchError::Configuration(format!(
                "pool {}: max_amount must cover min_amount and max_price must cover one tick",
                self.pool_id
            )));
        }
        // a full task of maximal orders must stay representable
        let task_notional = self
            .max_price
            .checked_mul(self.max_amount)
            .and_then(|n| n.checked_mul(Decimal::from(self.max_pending)));
        if task_notional.is_none() {
            return Err(VeilmatchError::Configuration(format!(
                "pool {}: max_price * max_amount * max_pending overflows",
                self.pool_id
            )));
        }
        Ok(())
    }
}
