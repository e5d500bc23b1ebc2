//! Proof boundary: bounded, cancellable proving attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use veilmatch_types::{
    MatchResult, Proof, ProofConfig, PublicInputs, Result, RetryStrategy, RevealedOrder, VeilmatchError,
};

use crate::backend::ProvingBackend;

/// Resolves once `cancel` flips to `true`. Never resolves if the sender is
/// dropped without cancelling.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Runs a [`ProvingBackend`] with a per-attempt timeout and exponential
/// backoff between attempts.
pub struct ProofBoundary {
    backend: Arc<dyn ProvingBackend>,
    max_attempts: u32,
    attempt_timeout: Duration,
    retry: RetryStrategy,
}

impl ProofBoundary {
    #[must_use]
    pub fn new(backend: Arc<dyn ProvingBackend>, config: &ProofConfig) -> Self {
        Self {
            backend,
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            retry: RetryStrategy::from(config),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ProvingBackend> {
        &self.backend
    }

    /// Prove `result`, retrying failed or timed-out attempts.
    ///
    /// Returns `ProofCancelled` as soon as `cancel` turns `true`, including
    /// mid-attempt and mid-backoff, and `ProofAttemptsExhausted` once the
    /// attempt budget is spent.
    pub async fn prove(
        &self,
        inputs: &PublicInputs,
        orders: &[RevealedOrder],
        result: &MatchResult,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Proof> {
        let task_id = inputs.task_id;
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            if *cancel.borrow() {
                return Err(VeilmatchError::ProofCancelled(task_id));
            }

            let outcome = tokio::select! {
                r = tokio::time::timeout(self.attempt_timeout, self.backend.prove(inputs, orders, result)) => r,
                () = cancelled(&mut cancel) => return Err(VeilmatchError::ProofCancelled(task_id)),
            };

            let err = match outcome {
                Ok(Ok(proof)) => {
                    tracing::info!(task = %task_id, attempt, bytes = proof.len(), scheme = %proof.scheme, "Proof generated");
                    return Ok(proof);
                }
                Ok(Err(e)) => e,
                Err(_) => VeilmatchError::ProofTimeout { attempt },
            };
            tracing::warn!(task = %task_id, attempt, error = %err, "Proof attempt failed");
            last = err.to_string();

            if attempt < self.max_attempts {
                tokio::select! {
                    () = tokio::time::sleep(self.retry.delay_for_attempt(attempt)) => {}
                    () = cancelled(&mut cancel) => return Err(VeilmatchError::ProofCancelled(task_id)),
                }
            }
        }

        tracing::error!(task = %task_id, attempts = self.max_attempts, "Proof attempts exhausted");
        Err(VeilmatchError::ProofAttemptsExhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    #[must_use]
    pub fn verify(&self, proof: &Proof, inputs: &PublicInputs) -> bool {
        self.backend.verify(proof, inputs)
    }
}

impl std::fmt::Debug for ProofBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofBoundary")
            .field("scheme", &self.backend.scheme())
            .field("max_attempts", &self.max_attempts)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}
