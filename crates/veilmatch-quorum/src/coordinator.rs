//! Per-task quorum coordinator.
//!
//! One actor owns a task's [`VoteTally`]. Votes arrive over an mpsc inbox;
//! the actor stops at the first closed tally outcome or at the deadline
//! (task deadline plus grace), publishes a single [`QuorumOutcome`] on a
//! watch channel, then reports dissenting voters to the registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use veilmatch_types::{ErrorClass, OperatorVote, Result, TaskId, VeilmatchError};

use crate::registry::OperatorRegistry;
use crate::tally::{TallyOutcome, VoteTally};

const VOTE_INBOX: usize = 256;

/// Final word on a task's agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumOutcome {
    /// `result_hash` reached the stake threshold; `signatures` are its votes.
    Finalized {
        result_hash: [u8; 32],
        weight: u128,
        signatures: Vec<OperatorVote>,
    },
    /// No quorum. `class` is `Timing` when the deadline cut collection short,
    /// `Agreement` when the votes made quorum impossible.
    Failed {
        class: ErrorClass,
        best_weight: u128,
        assigned_weight: u128,
    },
}

impl QuorumOutcome {
    #[must_use]
    pub fn finalized_hash(&self) -> Option<[u8; 32]> {
        match self {
            Self::Finalized { result_hash, .. } => Some(*result_hash),
            Self::Failed { .. } => None,
        }
    }

    /// The error a failed outcome stands for.
    #[must_use]
    pub fn to_error(&self, task: TaskId) -> Option<VeilmatchError> {
        match self {
            Self::Finalized { .. } => None,
            Self::Failed {
                class: ErrorClass::Timing,
                ..
            } => Some(VeilmatchError::DeadlineExpired(task)),
            Self::Failed {
                best_weight,
                assigned_weight,
                ..
            } => Some(VeilmatchError::QuorumNotReached {
                task,
                best_weight: *best_weight,
                assigned_weight: *assigned_weight,
            }),
        }
    }
}

/// Convert a wall-clock deadline into a tokio instant, adding `grace`.
///
/// A deadline already in the past maps to "now plus grace".
#[must_use]
pub fn deadline_instant(deadline: DateTime<Utc>, grace: Duration) -> Instant {
    let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Instant::now() + remaining + grace
}

/// Handle to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    task_id: TaskId,
    votes: mpsc::Sender<OperatorVote>,
    outcome: watch::Receiver<Option<QuorumOutcome>>,
}

impl CoordinatorHandle {
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Inbox sender, for registration with a [`crate::VoteRouter`].
    #[must_use]
    pub fn inbox(&self) -> mpsc::Sender<OperatorVote> {
        self.votes.clone()
    }

    /// Hand a vote to the coordinator.
    pub async fn submit(&self, vote: OperatorVote) -> Result<()> {
        self.votes
            .send(vote)
            .await
            .map_err(|_| VeilmatchError::TallyClosed(self.task_id))
    }

    /// Wait for the outcome.
    pub async fn outcome(&self) -> Result<QuorumOutcome> {
        let mut rx = self.outcome.clone();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| VeilmatchError::ChannelClosed(format!("coordinator for {}", self.task_id)))?;
        outcome
            .clone()
            .ok_or_else(|| VeilmatchError::Internal("coordinator outcome vanished".into()))
    }
}

/// The coordinator actor.
pub struct TaskCoordinator {
    tally: VoteTally,
    deadline: Instant,
    registry: Arc<dyn OperatorRegistry>,
    inbox: mpsc::Receiver<OperatorVote>,
    outcome: watch::Sender<Option<QuorumOutcome>>,
}

impl TaskCoordinator {
    /// Spawn the actor for `tally`, closing at `deadline` at the latest.
    #[must_use]
    pub fn spawn(tally: VoteTally, deadline: Instant, registry: Arc<dyn OperatorRegistry>) -> CoordinatorHandle {
        let (votes, inbox) = mpsc::channel(VOTE_INBOX);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let task_id = *tally.task_id();

        let actor = Self {
            tally,
            deadline,
            registry,
            inbox,
            outcome: outcome_tx,
        };
        tokio::spawn(actor.run());

        CoordinatorHandle {
            task_id,
            votes,
            outcome: outcome_rx,
        }
    }

    async fn run(mut self) {
        let task_id = *self.tally.task_id();
        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);
        let mut inbox_open = true;

        while !self.tally.outcome().is_closed() {
            tokio::select! {
                vote = self.inbox.recv(), if inbox_open => match vote {
                    Some(vote) => {
                        let operator = vote.operator_id;
                        if let Err(e) = self.tally.record(vote) {
                            tracing::warn!(
                                task = %task_id,
                                operator = %operator,
                                class = %e.class(),
                                error = %e,
                                "Vote rejected"
                            );
                        }
                    }
                    None => inbox_open = false,
                },
                () = &mut deadline => break,
            }
        }

        let timed_out = !self.tally.outcome().is_closed();
        let outcome = match self.tally.expire() {
            TallyOutcome::Reached { result_hash, weight } => QuorumOutcome::Finalized {
                result_hash,
                weight,
                signatures: self.tally.signatures_for(&result_hash),
            },
            TallyOutcome::Impossible { .. } | TallyOutcome::Pending => QuorumOutcome::Failed {
                class: if timed_out { ErrorClass::Timing } else { ErrorClass::Agreement },
                best_weight: self.tally.best_weight(),
                assigned_weight: self.tally.assigned_weight(),
            },
        };

        match &outcome {
            QuorumOutcome::Finalized { result_hash, weight, .. } => tracing::info!(
                task = %task_id,
                result_hash = hex::encode(result_hash),
                weight,
                assigned = self.tally.assigned_weight(),
                votes = self.tally.vote_count(),
                "Quorum reached"
            ),
            QuorumOutcome::Failed { class, best_weight, assigned_weight } => tracing::warn!(
                task = %task_id,
                class = %class,
                best_weight,
                assigned_weight,
                votes = self.tally.vote_count(),
                "Quorum failed"
            ),
        }
        self.outcome.send_replace(Some(outcome));

        for evidence in self.tally.dissenters() {
            let operator = evidence.operator_id;
            tracing::warn!(task = %task_id, operator = %operator, "Reporting divergent vote");
            if let Err(e) = self.registry.report_misbehavior(&operator, &task_id, evidence).await {
                tracing::error!(task = %task_id, operator = %operator, error = %e, "Misbehavior report failed");
            }
        }
    }
}
