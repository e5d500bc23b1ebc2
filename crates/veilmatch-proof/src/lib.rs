//! # veilmatch-proof
//!
//! **Proof Boundary**: attests that a finalized result was correctly
//! computed from its order set, exposing only public inputs
//! (task, pool, epoch, result hash) to verifiers.
//!
//! - [`ProvingBackend`]: the pluggable prover interface
//! - [`AttestationBackend`]: signed witness-digest reference backend
//! - [`ProofBoundary`]: per-attempt timeout, exponential backoff, cancellation
//! - [`ProofWorker`]: runs the boundary on its own tokio task

pub mod attestation;
pub mod backend;
pub mod boundary;
pub mod worker;

pub use attestation::{ATTESTATION_SCHEME, AttestationBackend, AttestationVerifier};
pub use backend::ProvingBackend;
pub use boundary::ProofBoundary;
pub use worker::{ProofHandle, ProofWorker};
