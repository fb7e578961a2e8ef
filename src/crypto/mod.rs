//! AES-256-GCM encryption for credential tokens, with key rotation.
//!
//! Each value is encrypted with a fresh random nonce, so identical
//! plaintexts never produce identical ciphertexts. The cipher holds two
//! keys: decryption tries the current key first and falls back to the
//! previous key if one is configured. Operators rotate by moving the
//! current key to the previous slot and provisioning a new current key;
//! records encrypted under the old key stay readable until it is retired.
//!
//! GCM is authenticated: a tampered or truncated ciphertext, or a key
//! mismatch, always fails with [`Error::Decryption`] and never yields
//! silently wrong plaintext.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// An encrypted value ready for textual storage.
///
/// Both fields are base64. Never logged and never returned by any API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub ciphertext: String,
    pub nonce: String,
}

/// Symmetric cipher for credential fields.
///
/// Stateless apart from the two configured keys; construct once and share.
pub struct CredentialCipher {
    current_key: Vec<u8>,
    previous_key: Option<Vec<u8>>,
}

impl CredentialCipher {
    /// Build a cipher from base64-encoded 256-bit keys.
    ///
    /// # Arguments
    /// * `current` - Active encryption key (used for all new encryptions)
    /// * `previous` - Optional prior key, accepted for decryption only
    pub fn new(current: &str, previous: Option<&str>) -> Result<Self, Error> {
        let current_key = decode_key(current)?;
        let previous_key = previous.map(decode_key).transpose()?;

        Ok(Self {
            current_key,
            previous_key,
        })
    }

    /// Encrypt a plaintext under the current key with a fresh random nonce.
    ///
    /// Fails with [`Error::EmptyPlaintext`] on empty input.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedBlob, Error> {
        if plaintext.is_empty() {
            return Err(Error::EmptyPlaintext);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.current_key)
            .map_err(|_| Error::InvalidKey("wrong key length".to_string()))?;

        // Fresh nonce per call (never reuse)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext_bytes = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Decryption)?;

        Ok(EncryptedBlob {
            ciphertext: BASE64.encode(&ciphertext_bytes),
            nonce: BASE64.encode(nonce),
        })
    }

    /// Decrypt a blob, trying the current key and then the previous key.
    ///
    /// Fails with [`Error::InvalidEncryptedData`] on malformed input and
    /// [`Error::Decryption`] when authentication fails under every
    /// configured key.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<String, Error> {
        if blob.ciphertext.is_empty() || blob.nonce.is_empty() {
            return Err(Error::InvalidEncryptedData);
        }

        let ciphertext_bytes = BASE64
            .decode(&blob.ciphertext)
            .map_err(|_| Error::InvalidEncryptedData)?;
        let nonce_bytes = BASE64
            .decode(&blob.nonce)
            .map_err(|_| Error::InvalidEncryptedData)?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(Error::InvalidEncryptedData);
        }

        if let Ok(plaintext) = decrypt_with_key(&self.current_key, &nonce_bytes, &ciphertext_bytes)
        {
            return Ok(plaintext);
        }

        // Rotation fallback: retry once with the previous key
        if let Some(previous) = &self.previous_key {
            if let Ok(plaintext) = decrypt_with_key(previous, &nonce_bytes, &ciphertext_bytes) {
                return Ok(plaintext);
            }
        }

        Err(Error::Decryption)
    }
}

fn decrypt_with_key(key: &[u8], nonce_bytes: &[u8], ciphertext: &[u8]) -> Result<String, Error> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidKey("wrong key length".to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext_bytes = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::Decryption)?;

    String::from_utf8(plaintext_bytes).map_err(|_| Error::Decryption)
}

fn decode_key(key_base64: &str) -> Result<Vec<u8>, Error> {
    let key_bytes = BASE64
        .decode(key_base64)
        .map_err(|_| Error::InvalidKey("not valid base64".to_string()))?;

    if key_bytes.len() != KEY_SIZE {
        return Err(Error::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_SIZE,
            key_bytes.len()
        )));
    }

    Ok(key_bytes)
}

/// Generate a new random 256-bit key, base64-encoded, for provisioning.
pub fn generate_key() -> String {
    use rand::RngCore;

    let mut key = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}

/// A key is valid iff it base64-decodes to exactly 32 bytes.
pub fn is_valid_key(candidate: &str) -> bool {
    decode_key(candidate).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::new(&generate_key(), None).unwrap()
    }

    #[test]
    fn test_generate_key_is_valid_and_unique() {
        let key1 = generate_key();
        let key2 = generate_key();

        assert!(is_valid_key(&key1));
        assert!(is_valid_key(&key2));
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key(&BASE64.encode([0u8; 32])));

        // Wrong lengths
        assert!(!is_valid_key(&BASE64.encode([0u8; 16])));
        assert!(!is_valid_key(&BASE64.encode([0u8; 64])));

        // Not base64 at all
        assert!(!is_valid_key("not-valid-base64!@#$"));
        assert!(!is_valid_key(""));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = "my-secret-access-token-12345";

        let blob = cipher.encrypt(plaintext).expect("encryption failed");
        assert_ne!(blob.ciphertext, plaintext);

        let decrypted = cipher.decrypt(&blob).expect("decryption failed");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_same_plaintext_never_repeats_ciphertext() {
        let cipher = test_cipher();

        let blob1 = cipher.encrypt("same-plaintext").unwrap();
        let blob2 = cipher.encrypt("same-plaintext").unwrap();

        assert_ne!(blob1.nonce, blob2.nonce);
        assert_ne!(blob1.ciphertext, blob2.ciphertext);

        assert_eq!(cipher.decrypt(&blob1).unwrap(), "same-plaintext");
        assert_eq!(cipher.decrypt(&blob2).unwrap(), "same-plaintext");
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        let cipher = test_cipher();
        assert_eq!(cipher.encrypt("").unwrap_err(), Error::EmptyPlaintext);
    }

    #[test]
    fn test_malformed_blob_rejected() {
        let cipher = test_cipher();

        let empty = EncryptedBlob {
            ciphertext: String::new(),
            nonce: String::new(),
        };
        assert_eq!(cipher.decrypt(&empty).unwrap_err(), Error::InvalidEncryptedData);

        let bad_base64 = EncryptedBlob {
            ciphertext: "!!not-base64!!".to_string(),
            nonce: "also-not".to_string(),
        };
        assert_eq!(
            cipher.decrypt(&bad_base64).unwrap_err(),
            Error::InvalidEncryptedData
        );

        // Valid base64 but wrong nonce size
        let short_nonce = EncryptedBlob {
            ciphertext: BASE64.encode(b"whatever"),
            nonce: BASE64.encode([0u8; 4]),
        };
        assert_eq!(
            cipher.decrypt(&short_nonce).unwrap_err(),
            Error::InvalidEncryptedData
        );
    }

    #[test]
    fn test_wrong_key_fails_with_decryption_error() {
        let cipher_a = test_cipher();
        let cipher_b = test_cipher();

        let blob = cipher_a.encrypt("secret").unwrap();
        assert_eq!(cipher_b.decrypt(&blob).unwrap_err(), Error::Decryption);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = test_cipher();
        let mut blob = cipher.encrypt("secret").unwrap();

        let mut bytes = BASE64.decode(&blob.ciphertext).unwrap();
        bytes[0] ^= 0xFF;
        blob.ciphertext = BASE64.encode(&bytes);

        assert_eq!(cipher.decrypt(&blob).unwrap_err(), Error::Decryption);
    }

    #[test]
    fn test_rotation_fallback_decrypts_old_records() {
        let old_key = generate_key();
        let new_key = generate_key();

        let old_cipher = CredentialCipher::new(&old_key, None).unwrap();
        let blob = old_cipher.encrypt("token-from-before-rotation").unwrap();

        // After rotation: old key moves to the previous slot
        let rotated = CredentialCipher::new(&new_key, Some(&old_key)).unwrap();
        assert_eq!(
            rotated.decrypt(&blob).unwrap(),
            "token-from-before-rotation"
        );

        // Without the previous key the record is unreadable
        let unrelated = CredentialCipher::new(&new_key, None).unwrap();
        assert_eq!(unrelated.decrypt(&blob).unwrap_err(), Error::Decryption);
    }

    #[test]
    fn test_new_encryptions_use_current_key_after_rotation() {
        let old_key = generate_key();
        let new_key = generate_key();

        let rotated = CredentialCipher::new(&new_key, Some(&old_key)).unwrap();
        let blob = rotated.encrypt("fresh-token").unwrap();

        // Decryptable with the new key alone
        let current_only = CredentialCipher::new(&new_key, None).unwrap();
        assert_eq!(current_only.decrypt(&blob).unwrap(), "fresh-token");
    }

    #[test]
    fn test_invalid_keys_rejected_at_construction() {
        assert!(CredentialCipher::new("too-short", None).is_err());

        let valid = generate_key();
        assert!(CredentialCipher::new(&valid, Some("nope")).is_err());
    }
}
