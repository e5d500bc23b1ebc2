//! Vote router: delivers incoming votes to the local coordinator of their task.
//!
//! Votes can reach an operator before it has sealed the task itself.
//! Those are held per task (bounded, oldest task evicted first) and flushed
//! into the coordinator's inbox when it registers.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{Mutex, mpsc};
use veilmatch_types::{OperatorVote, Result, TaskId, VeilmatchError};

const DEFAULT_BUFFERED_TASKS: usize = 1024;
const DEFAULT_VOTES_PER_TASK: usize = 64;

#[derive(Debug, Default)]
struct RouterState {
    live: HashMap<TaskId, mpsc::Sender<OperatorVote>>,
    early: HashMap<TaskId, Vec<OperatorVote>>,
    /// Insertion order of `early`, for eviction.
    early_order: VecDeque<TaskId>,
}

/// Routes votes by task id.
#[derive(Debug)]
pub struct VoteRouter {
    state: Mutex<RouterState>,
    max_buffered_tasks: usize,
    max_votes_per_task: usize,
}

impl Default for VoteRouter {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFERED_TASKS, DEFAULT_VOTES_PER_TASK)
    }
}

impl VoteRouter {
    /// # Panics
    /// Panics if either bound is zero.
    #[must_use]
    pub fn new(max_buffered_tasks: usize, max_votes_per_task: usize) -> Self {
        assert!(max_buffered_tasks > 0, "max_buffered_tasks must be positive");
        assert!(max_votes_per_task > 0, "max_votes_per_task must be positive");
        Self {
            state: Mutex::new(RouterState::default()),
            max_buffered_tasks,
            max_votes_per_task,
        }
    }

    /// Deliver `vote` to its coordinator, or buffer it until one registers.
    ///
    /// Fails with `TallyClosed` if the coordinator already finished.
    pub async fn route(&self, vote: OperatorVote) -> Result<()> {
        let task_id = vote.task_id;
        let sender = {
            let mut state = self.state.lock().await;
            match state.live.get(&task_id) {
                Some(sender) => sender.clone(),
                None => {
                    self.buffer(&mut state, vote);
                    return Ok(());
                }
            }
        };
        sender
            .send(vote)
            .await
            .map_err(|_| VeilmatchError::TallyClosed(task_id))
    }

    fn buffer(&self, state: &mut RouterState, vote: OperatorVote) {
        let task_id = vote.task_id;
        if !state.early.contains_key(&task_id) {
            while state.early_order.len() >= self.max_buffered_tasks {
                if let Some(old) = state.early_order.pop_front() {
                    state.early.remove(&old);
                    tracing::debug!(task = %old, "Evicted early votes");
                }
            }
            state.early_order.push_back(task_id);
        }
        let queue = state.early.entry(task_id).or_default();
        if queue.len() >= self.max_votes_per_task {
            tracing::warn!(task = %task_id, operator = %vote.operator_id, "Early vote buffer full, vote dropped");
            return;
        }
        tracing::debug!(task = %task_id, operator = %vote.operator_id, "Vote buffered before task sealed");
        queue.push(vote);
    }

    /// Attach a coordinator inbox for `task_id` and flush buffered votes into it.
    pub async fn register(&self, task_id: TaskId, sender: mpsc::Sender<OperatorVote>) -> Result<()> {
        let buffered = {
            let mut state = self.state.lock().await;
            state.live.insert(task_id, sender.clone());
            state.early_order.retain(|t| t != &task_id);
            state.early.remove(&task_id).unwrap_or_default()
        };
        if !buffered.is_empty() {
            tracing::debug!(task = %task_id, votes = buffered.len(), "Flushing early votes");
        }
        for vote in buffered {
            sender
                .send(vote)
                .await
                .map_err(|_| VeilmatchError::TallyClosed(task_id))?;
        }
        Ok(())
    }

    /// Detach the coordinator of `task_id`.
    pub async fn unregister(&self, task_id: &TaskId) {
        self.state.lock().await.live.remove(task_id);
    }

    /// Number of votes held for a task that has no coordinator yet.
    pub async fn buffered(&self, task_id: &TaskId) -> usize {
        self.state.lock().await.early.get(task_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VoteSigner;

    fn vote(task: u8) -> OperatorVote {
        VoteSigner::generate().sign_vote(&TaskId([task; 32]), [0; 32])
    }

    #[tokio::test]
    async fn buffers_then_flushes_on_register() {
        let router = VoteRouter::default();
        router.route(vote(1)).await.unwrap();
        router.route(vote(1)).await.unwrap();
        assert_eq!(router.buffered(&TaskId([1; 32])).await, 2);

        let (tx, mut rx) = mpsc::channel(8);
        router.register(TaskId([1; 32]), tx).await.unwrap();
        assert_eq!(router.buffered(&TaskId([1; 32])).await, 0);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());

        router.route(vote(1)).await.unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn evicts_oldest_task_buffer() {
        let router = VoteRouter::new(2, 4);
        router.route(vote(1)).await.unwrap();
        router.route(vote(2)).await.unwrap();
        router.route(vote(3)).await.unwrap();
        assert_eq!(router.buffered(&TaskId([1; 32])).await, 0);
        assert_eq!(router.buffered(&TaskId([2; 32])).await, 1);
        assert_eq!(router.buffered(&TaskId([3; 32])).await, 1);
    }

    #[tokio::test]
    async fn per_task_buffer_is_bounded() {
        let router = VoteRouter::new(4, 2);
        for _ in 0..5 {
            router.route(vote(1)).await.unwrap();
        }
        assert_eq!(router.buffered(&TaskId([1; 32])).await, 2);
    }

    #[tokio::test]
    async fn closed_coordinator_reports_tally_closed() {
        let router = VoteRouter::default();
        let (tx, rx) = mpsc::channel(1);
        router.register(TaskId([1; 32]), tx).await.unwrap();
        drop(rx);
        let err = router.route(vote(1)).await.unwrap_err();
        assert!(matches!(err, VeilmatchError::TallyClosed(_)));
    }
}
