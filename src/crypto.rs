//! Field-level encryption for message content and phone numbers.
//!
//! Content is sealed with AES-256-GCM under a key derived from
//! `ENCRYPTION_KEY`. Each value carries its own random 96-bit nonce, stored
//! as `base64(nonce || ciphertext)`. Phone numbers are also reduced to a
//! keyed SHA-256 fingerprint so they can be looked up without decrypting.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const FINGERPRINT_DOMAIN: &[u8] = b"sahaay:phone:v1:";

/// Symmetric cipher plus keyed fingerprinting, shared across the process.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
    fingerprint_key: [u8; 32],
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    pub fn new(secret: &SecretString) -> Result<Self, CryptoError> {
        let raw = secret.expose_secret();
        if raw.is_empty() {
            return Err(CryptoError::InvalidKey("key must not be empty".to_string()));
        }

        let key = Sha256::digest(raw.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let mut fingerprint_key = [0u8; 32];
        fingerprint_key.copy_from_slice(&Sha256::digest([FINGERPRINT_DOMAIN, raw.as_bytes()].concat()));

        Ok(Self {
            cipher,
            fingerprint_key,
        })
    }

    /// Encrypt `plaintext` into a self-contained base64 string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String, CryptoError> {
        let bytes = BASE64
            .decode(sealed)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(CryptoError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption(e.to_string()))
    }

    /// Deterministic lookup key for a phone number.
    ///
    /// Formatting differences ("+91 98765-43210" vs "919876543210") collapse
    /// to the same fingerprint.
    pub fn fingerprint(&self, phone: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint_key);
        hasher.update(normalize_phone(phone).as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Digits only, leading `+` and `whatsapp:` prefixes dropped.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .trim()
        .trim_start_matches("whatsapp:")
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(key: &str) -> FieldCipher {
        FieldCipher::new(&SecretString::from(key)).unwrap()
    }

    #[test]
    fn encrypt_then_decrypt() {
        let c = cipher("test-key");
        let sealed = c.encrypt("मुझे फसल ऋण चाहिए").unwrap();
        assert_ne!(sealed, "मुझे फसल ऋण चाहिए");
        assert_eq!(c.decrypt(&sealed).unwrap(), "मुझे फसल ऋण चाहिए");
    }

    #[test]
    fn nonces_differ_per_value() {
        let c = cipher("test-key");
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let sealed = cipher("key-a").encrypt("secret").unwrap();
        assert!(matches!(
            cipher("key-b").decrypt(&sealed),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn garbage_input_is_rejected() {
        let c = cipher("test-key");
        assert!(c.decrypt("not base64 !!").is_err());
        assert!(c.decrypt(&BASE64.encode([0u8; 4])).is_err());
    }

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(
            FieldCipher::new(&SecretString::from("")),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn fingerprint_ignores_formatting_but_not_key() {
        let c = cipher("test-key");
        let a = c.fingerprint("+91 98765-43210");
        assert_eq!(a, c.fingerprint("whatsapp:+919876543210"));
        assert_ne!(a, c.fingerprint("+919876543211"));
        assert_ne!(a, cipher("other-key").fingerprint("+919876543210"));
        assert_eq!(a.len(), 64);
    }
}
