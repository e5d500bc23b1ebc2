//! Operator votes on a task's result hash.

use serde::{Deserialize, Serialize};

use crate::{OperatorId, TaskId};

/// A signed claim that `operator_id` computed `result_hash` for `task_id`.
///
/// Signatures are ed25519 over [`OperatorVote::signing_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorVote {
    pub task_id: TaskId,
    pub operator_id: OperatorId,
    pub result_hash: [u8; 32],
    /// Raw 64-byte ed25519 signature.
    pub signature: Vec<u8>,
}

impl OperatorVote {
    /// Canonical bytes an operator signs.
    #[must_use]
    pub fn signing_payload(task_id: &TaskId, result_hash: &[u8; 32]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(22 + 64);
        buf.extend_from_slice(b"veilmatch:vote:v1:");
        buf.extend_from_slice(task_id.as_bytes());
        buf.extend_from_slice(result_hash);
        buf
    }

    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        Self::signing_payload(&self.task_id, &self.result_hash)
    }
}
