//! # veilmatch-quorum
//!
//! **Agreement Plane**: decides which result a task settles with.
//!
//! There is no leader and no voting round. Each assigned operator matches
//! the frozen order set on its own and signs the result hash; a result is
//! final once operators holding the threshold share of assigned stake
//! signed the same hash.
//!
//! - [`select_committee`]: stake-weighted, seeded by the task id
//! - [`VoteSigner`] / [`verify_vote`]: ed25519 over `(task, result hash)`
//! - [`VoteTally`]: exact integer threshold arithmetic, early failure
//! - [`TaskCoordinator`]: one actor per task owns the tally until the deadline
//! - [`VoteRouter`]: delivers votes to coordinators, buffering early arrivals
//! - [`OperatorRegistry`]: operator snapshots and misbehavior reports

pub mod coordinator;
pub mod registry;
pub mod router;
pub mod selection;
pub mod signing;
pub mod tally;

pub use coordinator::{CoordinatorHandle, QuorumOutcome, TaskCoordinator, deadline_instant};
pub use registry::{OperatorRegistry, snapshot_operators};
pub use router::VoteRouter;
pub use selection::select_committee;
pub use signing::{VoteSigner, verify_vote};
pub use tally::{TallyOutcome, VoteTally};
