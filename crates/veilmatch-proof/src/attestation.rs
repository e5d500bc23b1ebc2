//! Attestation backend.
//!
//! Proof layout (129 bytes):
//! ```text
//! version (1) || attester public key (32) || witness digest (32) || ed25519 signature (64)
//! ```
//! The witness digest commits to the order set and the result; the
//! signature covers the public inputs and the digest. Verifiers accept only
//! keys they trust. This is a stand-in with the same interface as a
//! succinct proof system, not a zero-knowledge proof: soundness rests on the
//! attester's honesty, which the quorum already vouches for.

use std::collections::BTreeSet;

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use veilmatch_matchcore::verify_result_hash;
use veilmatch_settlement::ConservationCheck;
use veilmatch_types::{
    MatchResult, Proof, PublicInputs, Result, RevealedOrder, VeilmatchError, compute_order_set_hash,
};

use crate::backend::ProvingBackend;

pub const ATTESTATION_SCHEME: &str = "attestation-ed25519-v1";

const VERSION: u8 = 1;
const PROOF_LEN: usize = 1 + 32 + 32 + 64;

fn witness_digest(inputs: &PublicInputs, orders: &[RevealedOrder]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"veilmatch:witness:v1:");
    hasher.update(compute_order_set_hash(&inputs.task_id, orders));
    hasher.update(inputs.result_hash);
    hasher.finalize().into()
}

fn signing_message(inputs: &PublicInputs, digest: &[u8; 32]) -> Vec<u8> {
    let mut msg = b"veilmatch:attestation:v1:".to_vec();
    msg.extend_from_slice(&inputs.to_bytes());
    msg.extend_from_slice(digest);
    msg
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Checks attestation proofs against a set of trusted attester keys.
#[derive(Debug, Clone, Default)]
pub struct AttestationVerifier {
    trusted: BTreeSet<[u8; 32]>,
}

impl AttestationVerifier {
    #[must_use]
    pub fn new(trusted: impl IntoIterator<Item = [u8; 32]>) -> Self {
        Self {
            trusted: trusted.into_iter().collect(),
        }
    }

    pub fn trust(&mut self, key: [u8; 32]) {
        self.trusted.insert(key);
    }

    #[must_use]
    pub fn verify(&self, proof: &Proof, inputs: &PublicInputs) -> bool {
        if proof.scheme != ATTESTATION_SCHEME || proof.bytes.len() != PROOF_LEN || proof.bytes[0] != VERSION {
            return false;
        }
        let Ok(key_bytes) = <[u8; 32]>::try_from(&proof.bytes[1..33]) else {
            return false;
        };
        let Ok(digest) = <[u8; 32]>::try_from(&proof.bytes[33..65]) else {
            return false;
        };
        if !self.trusted.contains(&key_bytes) {
            return false;
        }
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&proof.bytes[65..]) else {
            return false;
        };
        key.verify_strict(&signing_message(inputs, &digest), &signature).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Reference proving backend: signs a witness digest after re-checking
/// determinism and conservation of the result.
pub struct AttestationBackend {
    key: SigningKey,
    verifier: AttestationVerifier,
}

impl AttestationBackend {
    /// Backend attesting with `key`, trusting its own key plus `trusted`.
    #[must_use]
    pub fn new(key: SigningKey, trusted: impl IntoIterator<Item = [u8; 32]>) -> Self {
        let mut verifier = AttestationVerifier::new(trusted);
        verifier.trust(key.verifying_key().to_bytes());
        Self { key, verifier }
    }

    #[must_use]
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng), [])
    }

    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    #[must_use]
    pub fn verifier(&self) -> &AttestationVerifier {
        &self.verifier
    }

    fn check_witness(inputs: &PublicInputs, orders: &[RevealedOrder], result: &MatchResult) -> Result<()> {
        let refuse = |reason: String| VeilmatchError::ProofGeneration { reason };
        if result.task_id != inputs.task_id {
            return Err(refuse(format!("result for {} offered for {}", result.task_id, inputs.task_id)));
        }
        if result.result_hash != inputs.result_hash {
            return Err(refuse("result hash differs from public input".into()));
        }
        if !verify_result_hash(result) {
            return Err(refuse("result hash does not recompute".into()));
        }
        ConservationCheck::new(orders)
            .verify(result)
            .map_err(|e| refuse(e.to_string()))
    }
}

#[async_trait]
impl ProvingBackend for AttestationBackend {
    fn scheme(&self) -> &str {
        ATTESTATION_SCHEME
    }

    async fn prove(&self, inputs: &PublicInputs, orders: &[RevealedOrder], result: &MatchResult) -> Result<Proof> {
        Self::check_witness(inputs, orders, result)?;

        let digest = witness_digest(inputs, orders);
        let signature = self.key.sign(&signing_message(inputs, &digest));

        let mut bytes = Vec::with_capacity(PROOF_LEN);
        bytes.push(VERSION);
        bytes.extend_from_slice(&self.public_key());
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(&signature.to_bytes());

        tracing::debug!(task = %inputs.task_id, digest = hex::encode(digest), "Attestation produced");
        Ok(Proof {
            scheme: ATTESTATION_SCHEME.to_string(),
            bytes,
        })
    }

    fn verify(&self, proof: &Proof, inputs: &PublicInputs) -> bool {
        self.verifier.verify(proof, inputs)
    }
}

impl std::fmt::Debug for AttestationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationBackend")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}
