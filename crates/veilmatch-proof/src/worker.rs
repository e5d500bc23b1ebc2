//! Proof worker: proving on its own tokio task.
//!
//! The pipeline hands the boundary a task's witness and keeps a
//! [`ProofHandle`]. The handle reports back over a oneshot and can cancel
//! in-flight proving when the task is Failed elsewhere or its deadline
//! passes.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use veilmatch_types::{MatchResult, Proof, PublicInputs, Result, RevealedOrder, TaskId, VeilmatchError};

use crate::boundary::ProofBoundary;

/// Spawns proving jobs.
#[derive(Debug)]
pub struct ProofWorker;

impl ProofWorker {
    /// Start proving `result` for `inputs.task_id` in the background.
    #[must_use]
    pub fn spawn(
        boundary: Arc<ProofBoundary>,
        inputs: PublicInputs,
        orders: Vec<RevealedOrder>,
        result: MatchResult,
    ) -> ProofHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();
        let task_id = inputs.task_id;

        tokio::spawn(async move {
            let outcome = boundary.prove(&inputs, &orders, &result, cancel_rx).await;
            if done_tx.send(outcome).is_err() {
                tracing::debug!(task = %inputs.task_id, "Proof finished after its handle was dropped");
            }
        });

        ProofHandle {
            task_id,
            cancel: cancel_tx,
            done: done_rx,
        }
    }
}

/// Handle to one in-flight proving job.
#[derive(Debug)]
pub struct ProofHandle {
    task_id: TaskId,
    cancel: watch::Sender<bool>,
    done: oneshot::Receiver<Result<Proof>>,
}

impl ProofHandle {
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Ask the worker to stop. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for the proof.
    pub async fn join(self) -> Result<Proof> {
        self.done
            .await
            .map_err(|_| VeilmatchError::ChannelClosed(format!("proof worker for {}", self.task_id)))?
    }

    /// Wait for the proof, cancelling the job if `deadline` passes first.
    pub async fn join_until(self, deadline: Instant) -> Result<Proof> {
        let Self { task_id, cancel, done } = self;
        tokio::select! {
            r = done => r.map_err(|_| VeilmatchError::ChannelClosed(format!("proof worker for {task_id}")))?,
            () = tokio::time::sleep_until(deadline) => {
                cancel.send_replace(true);
                tracing::warn!(task = %task_id, "Proof deadline passed, cancelled");
                Err(VeilmatchError::ProofCancelled(task_id))
            }
        }
    }
}
