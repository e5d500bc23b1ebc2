//! Vote transport port.

use async_trait::async_trait;
use veilmatch_types::{OperatorId, OperatorVote, Result};

/// Carries signed votes between committee members.
///
/// Delivery is best effort: the coordinator's deadline bounds how long a
/// task waits for votes that never arrive.
#[async_trait]
pub trait VoteTransport: Send + Sync {
    /// Send `vote` to every member of `committee` except its author.
    async fn broadcast(&self, committee: &[OperatorId], vote: &OperatorVote) -> Result<()>;
}
