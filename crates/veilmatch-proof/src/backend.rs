//! Proving backend interface.

use async_trait::async_trait;
use veilmatch_types::{MatchResult, Proof, PublicInputs, Result, RevealedOrder};

/// Produces and checks proofs that `result` follows from `orders`.
///
/// `verify` sees only the public inputs. It returns `false` for tampered
/// proofs or mismatched inputs and never panics.
#[async_trait]
pub trait ProvingBackend: Send + Sync {
    /// Identifier carried in [`Proof::scheme`].
    fn scheme(&self) -> &str;

    /// Prove one task's result. A single attempt; retries live in the boundary.
    async fn prove(&self, inputs: &PublicInputs, orders: &[RevealedOrder], result: &MatchResult) -> Result<Proof>;

    fn verify(&self, proof: &Proof, inputs: &PublicInputs) -> bool;
}
