//! # veilmatch-node
//!
//! **Operator runtime**: wires intake, matching, quorum, proving and
//! settlement into one epoch pipeline.
//!
//! ## Architecture
//!
//! 1. **OperatorNode**: per-epoch pipeline, one tokio `JoinSet` lane per sealed task
//! 2. **StateStore**: durable snapshot of pending sets, in-flight tasks, own votes,
//!    commitment statuses and cursors (`MemoryStore`, `JsonFileStore`)
//! 3. **VoteTransport**: carries signed votes to the task committee
//! 4. **memory**: in-process ledger, registry and transport for tests and simulation
//!
//! ## Epoch Flow
//!
//! ```text
//! CommitmentFeed → OrderIntake → TaskSealer → MatchingTask
//!     → match_task → VoteSigner → VoteTransport ⇄ VoteRouter → TaskCoordinator
//!     → ProofWorker → SettlementSubmitter → Ledger
//! ```

pub mod memory;
pub mod operator;
pub mod store;
pub mod transport;

pub use memory::{MemoryLedger, RecordingTransport, Report, StaticRegistry};
pub use operator::{EpochReport, NodeDeps, OperatorNode, TaskOutcome};
pub use store::{InFlightTask, JsonFileStore, MemoryStore, NodeSnapshot, StateStore};
pub use transport::VoteTransport;
