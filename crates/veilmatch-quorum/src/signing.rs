//! Vote signing and verification (ed25519).

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use veilmatch_types::{OperatorId, OperatorVote, Result, TaskId, VeilmatchError};

/// Holds an operator's signing key.
pub struct VoteSigner {
    key: SigningKey,
}

impl VoteSigner {
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    #[must_use]
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(secret))
    }

    /// Parse a hex-encoded 32-byte secret key.
    pub fn from_hex(hex_secret: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(hex_secret.trim())
            .map_err(|e| VeilmatchError::Crypto(format!("operator key is not hex: {e}")))?
            .try_into()
            .map_err(|_| VeilmatchError::Crypto("operator key must be 32 bytes".into()))?;
        Ok(Self::from_secret(&bytes))
    }

    #[must_use]
    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    #[must_use]
    pub fn operator_id(&self) -> OperatorId {
        OperatorId(self.public_key())
    }

    /// Sign this operator's vote for `result_hash` on `task_id`.
    #[must_use]
    pub fn sign_vote(&self, task_id: &TaskId, result_hash: [u8; 32]) -> OperatorVote {
        let payload = OperatorVote::signing_payload(task_id, &result_hash);
        let signature = self.key.sign(&payload);
        OperatorVote {
            task_id: *task_id,
            operator_id: self.operator_id(),
            result_hash,
            signature: signature.to_bytes().to_vec(),
        }
    }
}

impl std::fmt::Debug for VoteSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteSigner")
            .field("operator", &self.operator_id())
            .finish_non_exhaustive()
    }
}

/// Whether `vote` carries a valid signature under `public_key`.
///
/// Malformed keys or signatures yield `false`.
#[must_use]
pub fn verify_vote(vote: &OperatorVote, public_key: &[u8; 32]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&vote.signature) else {
        return false;
    };
    key.verify_strict(&vote.payload(), &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let signer = VoteSigner::generate();
        let vote = signer.sign_vote(&TaskId([1; 32]), [2; 32]);
        assert_eq!(vote.operator_id, signer.operator_id());
        assert!(verify_vote(&vote, &signer.public_key()));
    }

    #[test]
    fn wrong_key_fails() {
        let vote = VoteSigner::generate().sign_vote(&TaskId([1; 32]), [2; 32]);
        assert!(!verify_vote(&vote, &VoteSigner::generate().public_key()));
    }

    #[test]
    fn altered_hash_fails() {
        let signer = VoteSigner::generate();
        let mut vote = signer.sign_vote(&TaskId([1; 32]), [2; 32]);
        vote.result_hash[0] ^= 1;
        assert!(!verify_vote(&vote, &signer.public_key()));
    }

    #[test]
    fn truncated_signature_fails() {
        let signer = VoteSigner::generate();
        let mut vote = signer.sign_vote(&TaskId([1; 32]), [2; 32]);
        vote.signature.truncate(10);
        assert!(!verify_vote(&vote, &signer.public_key()));
    }

    #[test]
    fn hex_roundtrip() {
        let signer = VoteSigner::generate();
        let back = VoteSigner::from_hex(&signer.secret_hex()).unwrap();
        assert_eq!(back.operator_id(), signer.operator_id());
        assert!(VoteSigner::from_hex("zz").is_err());
        assert!(VoteSigner::from_hex("abcd").is_err());
    }
}
