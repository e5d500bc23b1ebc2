//! Persisted operator state.
//!
//! A [`NodeSnapshot`] holds everything an operator needs to pick up where it
//! stopped: staged orders, feed cursors, tasks that have not ended, the vote
//! it cast on each of them, commitment statuses and settled task ids.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use veilmatch_types::{
    CommitmentId, CommitmentStatus, EpochId, MatchResult, MatchingTask, OperatorSnapshot, OperatorVote, PoolId, Result,
    RevealedOrder, TaskId,
};

/// A task this operator has sealed but not yet seen settle or fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightTask {
    pub task: MatchingTask,
    /// Registry snapshot captured when the committee was selected.
    pub operators: Option<OperatorSnapshot>,
    /// Locally computed result.
    pub result: Option<MatchResult>,
    /// The vote this operator cast. Re-broadcast, never re-signed, on restart.
    pub vote: Option<OperatorVote>,
}

/// Point-in-time operator state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub epoch: EpochId,
    pub cursors: BTreeMap<PoolId, u64>,
    pub pending: BTreeMap<PoolId, Vec<RevealedOrder>>,
    pub in_flight: Vec<InFlightTask>,
    pub statuses: BTreeMap<CommitmentId, CommitmentStatus>,
    /// Settled task ids, oldest first.
    pub settled: Vec<TaskId>,
    pub saved_at: DateTime<Utc>,
}

impl NodeSnapshot {
    #[must_use]
    pub fn empty(epoch: EpochId) -> Self {
        Self {
            epoch,
            cursors: BTreeMap::new(),
            pending: BTreeMap::new(),
            in_flight: Vec::new(),
            statuses: BTreeMap::new(),
            settled: Vec::new(),
            saved_at: Utc::now(),
        }
    }

    /// Recorded own vote for `task_id`, if any.
    #[must_use]
    pub fn vote_for(&self, task_id: &TaskId) -> Option<&OperatorVote> {
        self.in_flight
            .iter()
            .find(|t| t.task.task_id == *task_id)
            .and_then(|t| t.vote.as_ref())
    }
}

/// Durable home of the latest [`NodeSnapshot`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The last saved snapshot, or `None` on first start.
    async fn load(&self) -> Result<Option<NodeSnapshot>>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &NodeSnapshot) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Keeps the snapshot in memory. Survives a node being dropped and rebuilt
/// over the same store, which is what restart tests need.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<NodeSnapshot>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<NodeSnapshot>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &NodeSnapshot) -> Result<()> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Stores the snapshot as pretty JSON. Writes go to a sibling `.tmp` file
/// which is then renamed over the target, so a crash mid-write leaves the
/// previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/state.json`.
    #[must_use]
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join("state.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<NodeSnapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &NodeSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let encoded = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), bytes = encoded.len(), "Snapshot saved");
        Ok(())
    }
}
