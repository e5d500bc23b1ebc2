//! # veilmatch-settlement
//!
//! **Finality Plane**: turns a finalized task into a ledger settlement.
//!
//! ## Architecture
//!
//! The submitter receives a Finalized [`MatchingTask`], its proof and the
//! quorum signatures, and:
//! 1. Refuses anything not Finalized or not matching the finalized hash
//! 2. Blocks a second submission for the same task (idempotency)
//! 3. Submits to the [`Ledger`], refreshing the nonce on retryable rejections
//! 4. Returns a [`SettlementReceipt`] or a `Ledger`-class error
//!
//! [`ConservationCheck`] verifies that a result neither creates nor
//! destroys size relative to its input orders.
//!
//! [`MatchingTask`]: veilmatch_types::MatchingTask
//! [`SettlementReceipt`]: veilmatch_types::SettlementReceipt

pub mod conservation;
pub mod idempotency;
pub mod ledger;
pub mod submitter;

pub use conservation::ConservationCheck;
pub use idempotency::IdempotencyGuard;
pub use ledger::{Ledger, LedgerResponse};
pub use submitter::SettlementSubmitter;
