//! Settlement idempotency guard: a task settles at most once.
//!
//! Each task settles at most once. Marking the same `TaskId` a second time
//! returns [`VeilmatchError::AlreadySettled`].
//!
//! The guard keeps a bounded FIFO cache so memory stays predictable in
//! long-running operators; the ledger itself rejects double settlement of
//! anything evicted here.

use std::collections::{HashSet, VecDeque};

use veilmatch_types::{Result, TaskId, VeilmatchError};

/// Remembers settled task ids.
#[derive(Debug)]
pub struct IdempotencyGuard {
    settled: HashSet<TaskId>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<TaskId>,
    max_size: usize,
}

impl IdempotencyGuard {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "IdempotencyGuard max_size must be > 0");
        Self {
            settled: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// Fail if `task_id` was already settled.
    pub fn check(&self, task_id: &TaskId) -> Result<()> {
        if self.is_settled(task_id) {
            return Err(VeilmatchError::AlreadySettled(*task_id));
        }
        Ok(())
    }

    /// Mark a task as settled.
    pub fn mark_settled(&mut self, task_id: TaskId) -> Result<()> {
        self.check(&task_id)?;

        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }

        self.settled.insert(task_id);
        self.order.push_back(task_id);
        Ok(())
    }

    #[must_use]
    pub fn is_settled(&self, task_id: &TaskId) -> bool {
        self.settled.contains(task_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settled.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }

    /// Settled ids, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.order.iter()
    }
}
