//! Authenticated encryption for small secrets.
//!
//! Used in two places: tenant provider API secrets at rest, and gateway
//! connection tokens handed to clients. Payloads are sealed with
//! AES-256-GCM under a process-wide key and encoded as URL-safe base64
//! (`nonce || ciphertext`).

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::error::CoreError;

const NONCE_LEN: usize = 12;

/// Seals and opens secrets under a fixed 256-bit key.
pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    /// Build a sealer from a base64 (standard alphabet) encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CoreError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CoreError::Validation(format!("Sealing key is not valid base64: {e}")))?;
        if bytes.len() != 32 {
            return Err(CoreError::Validation(format!(
                "Sealing key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt `plaintext`, returning a URL-safe token.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CoreError::Internal("Sealing failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    /// Decrypt a token produced by [`seal`](Self::seal).
    ///
    /// Any tampering, truncation, or wrong-key token fails validation;
    /// callers treat that as an invalid credential, not an internal error.
    pub fn open(&self, token: &str) -> Result<Vec<u8>, CoreError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CoreError::Validation("Malformed sealed token".into()))?;
        if raw.len() <= NONCE_LEN {
            return Err(CoreError::Validation("Malformed sealed token".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Validation("Sealed token failed authentication".into()))
    }

    /// Convenience for string payloads.
    pub fn open_string(&self, token: &str) -> Result<String, CoreError> {
        let bytes = self.open(token)?;
        String::from_utf8(bytes)
            .map_err(|_| CoreError::Validation("Sealed token is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sealer() -> Sealer {
        Sealer::from_base64_key(&STANDARD.encode([7u8; 32])).unwrap()
    }

    #[test]
    fn seal_open_round_trip() {
        let sealer = test_sealer();
        let token = sealer.seal(b"rdp-password").unwrap();
        assert_eq!(sealer.open(&token).unwrap(), b"rdp-password");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let sealer = test_sealer();
        let a = sealer.seal(b"same").unwrap();
        let b = sealer.seal(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let sealer = test_sealer();
        let mut token = sealer.seal(b"secret").unwrap();
        token.pop();
        token.push('A');
        assert!(sealer.open(&token).is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = test_sealer().seal(b"secret").unwrap();
        let other = Sealer::from_base64_key(&STANDARD.encode([9u8; 32])).unwrap();
        assert!(other.open(&token).is_err());
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(Sealer::from_base64_key(&STANDARD.encode([1u8; 16])).is_err());
    }
}
