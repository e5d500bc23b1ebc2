//! # veilmatch-types
//!
//! Shared types, errors, and configuration for **VeilMatch** operators.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`CommitmentId`], [`PoolId`], [`OperatorId`], [`EpochId`], [`TaskId`]
//! - **Commitment model**: [`OrderCommitment`], [`CommitmentStatus`], [`RevealedPayload`], [`RevealedOrder`], [`OrderSide`]
//! - **Task model**: [`MatchingTask`], [`TaskPhase`]
//! - **Result model**: [`MatchResult`], [`MatchedPair`]
//! - **Quorum model**: [`OperatorVote`], [`Operator`], [`OperatorSnapshot`]
//! - **Settlement model**: [`SettlementRecord`], [`Proof`], [`PublicInputs`], [`LedgerRejection`]
//! - **Configuration**: [`NodeConfig`], [`PoolConfig`], [`QuorumConfig`], [`ProofConfig`], [`SettlementConfig`], [`EpochConfig`]
//! - **Retries**: [`RetryStrategy`]
//! - **Errors**: [`VeilmatchError`] with `VM_ERR_` prefix codes and [`ErrorClass`]
//! - **Constants**: system-wide limits and defaults

pub mod commitment;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod operator;
pub mod order;
pub mod result;
pub mod retry;
pub mod settlement;
pub mod task;
pub mod vote;

// Re-export all primary types at crate root for ergonomic imports:
//   use veilmatch_types::{OrderCommitment, RevealedOrder, MatchingTask, ...};

pub use commitment::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use operator::*;
pub use order::*;
pub use result::*;
pub use retry::RetryStrategy;
pub use settlement::*;
pub use task::*;
pub use vote::*;

// Constants are accessed via `veilmatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
