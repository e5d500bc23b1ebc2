//! Retry strategy shared by proving and settlement submission.

use std::time::Duration;

use crate::{ProofConfig, SettlementConfig};

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Fixed { delay: Duration },
    /// `initial * 2^(attempt - 1)`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl RetryStrategy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay } => *delay,
            Self::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(*max)
            }
        }
    }
}

impl From<&ProofConfig> for RetryStrategy {
    fn from(cfg: &ProofConfig) -> Self {
        Self::Exponential {
            initial: Duration::from_millis(cfg.backoff_ms),
            max: Duration::from_millis(cfg.max_backoff_ms),
        }
    }
}

impl From<&SettlementConfig> for RetryStrategy {
    fn from(cfg: &SettlementConfig) -> Self {
        Self::Exponential {
            initial: Duration::from_millis(cfg.backoff_ms),
            max: Duration::from_millis(cfg.max_backoff_ms),
        }
    }
}
