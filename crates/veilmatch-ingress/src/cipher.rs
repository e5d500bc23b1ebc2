//! Payload encryption for order commitments.
//!
//! Wire format: `nonce(12) || ciphertext`, where the plaintext is the
//! JSON-encoded [`RevealedPayload`].

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use veilmatch_types::constants::PAYLOAD_NONCE_LEN;
use veilmatch_types::{Result, RevealedPayload, VeilmatchError};

/// Seals and opens commitment payloads.
pub trait PayloadCipher: Send + Sync {
    /// Encrypt raw plaintext into the wire format.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt the wire format back into plaintext.
    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>>;

    /// Encrypt a payload as a submitter would.
    fn seal_payload(&self, payload: &RevealedPayload) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(payload)?;
        self.encrypt(&plaintext)
    }

    /// Decrypt and decode a payload.
    fn open_payload(&self, sealed: &[u8]) -> Result<RevealedPayload> {
        let plaintext = self.decrypt(sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// AES-256-GCM with a random 96-bit nonce per payload.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Fresh random key, for tests and local simulation.
    #[must_use]
    pub fn generate_key() -> [u8; 32] {
        Aes256Gcm::generate_key(&mut OsRng).into()
    }
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}

impl PayloadCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| VeilmatchError::Crypto(format!("payload encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(PAYLOAD_NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() <= PAYLOAD_NONCE_LEN {
            return Err(VeilmatchError::Crypto(format!(
                "payload too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(PAYLOAD_NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| VeilmatchError::Crypto(format!("payload decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use veilmatch_types::OrderSide;

    use super::*;

    #[test]
    fn seal_and_open_payload() {
        let cipher = AesGcmCipher::new(&AesGcmCipher::generate_key());
        let payload = RevealedPayload::dummy(OrderSide::Buy, Decimal::new(10, 0), Decimal::new(100, 0));
        let sealed = cipher.seal_payload(&payload).unwrap();
        assert!(sealed.len() > PAYLOAD_NONCE_LEN);
        assert_eq!(cipher.open_payload(&sealed).unwrap(), payload);
    }

    #[test]
    fn nonces_are_fresh() {
        let cipher = AesGcmCipher::new(&[7; 32]);
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a[..PAYLOAD_NONCE_LEN], b[..PAYLOAD_NONCE_LEN]);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = AesGcmCipher::new(&[1; 32]).encrypt(b"secret").unwrap();
        let err = AesGcmCipher::new(&[2; 32]).decrypt(&sealed).unwrap_err();
        assert!(matches!(err, VeilmatchError::Crypto(_)));
    }

    #[test]
    fn flipped_bit_fails() {
        let cipher = AesGcmCipher::new(&[3; 32]);
        let mut sealed = cipher.encrypt(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(cipher.decrypt(&sealed).is_err());
    }

    #[test]
    fn truncated_payload_fails() {
        let cipher = AesGcmCipher::new(&[3; 32]);
        assert!(cipher.decrypt(&[0u8; 5]).is_err());
        assert!(cipher.decrypt(&[]).is_err());
    }

    #[test]
    fn garbage_plaintext_fails_to_decode() {
        let cipher = AesGcmCipher::new(&[4; 32]);
        let sealed = cipher.encrypt(b"not json").unwrap();
        assert!(matches!(
            cipher.open_payload(&sealed),
            Err(VeilmatchError::Serialization(_))
        ));
    }
}
