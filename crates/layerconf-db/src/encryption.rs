// crates/layerconf-db/src/encryption.rs
// ============================================================================
// Module: Column Encryption
// Description: Authenticated encryption for sensitive column values.
// Purpose: Keep configuration payloads encrypted at rest.
// Dependencies: aes-gcm, rand, sha2, hex
// ============================================================================

//! ## Overview
//! Values are sealed with AES-256-GCM using a fresh random 96-bit nonce per
//! call and no associated data. The stored form is
//! `<key id><hex(nonce || ciphertext || tag)>` where the key id is a short
//! SHA-256 fingerprint of the key. The key id only identifies which key
//! sealed a value; it is not secret and carries no integrity guarantee.
//! Security posture: ciphertext read back from storage is untrusted and is
//! always authenticated before use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Digest;
use sha2::Sha256;

use crate::error::DbError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Key size in bytes.
pub const KEY_BYTES: usize = 32;
/// Nonce size in bytes.
const NONCE_BYTES: usize = 12;
/// Number of fingerprint bytes used as key id.
const KEY_ID_BYTES: usize = 16;

// ============================================================================
// SECTION: Encryptor
// ============================================================================

/// AES-256-GCM column encryptor bound to one key.
#[derive(Clone)]
pub struct Encryptor {
    /// Initialized cipher.
    cipher: Aes256Gcm,
    /// Hex fingerprint prefixed to every ciphertext.
    key_id: String,
}

impl Encryptor {
    /// Creates an encryptor from a hex encoded 32-byte key.
    ///
    /// Surrounding whitespace is ignored so key files may end with a newline.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Encryption`] when the key is not 64 hex characters.
    pub fn new(hex_key: &str) -> Result<Self, DbError> {
        let trimmed = hex_key.trim();
        let key = hex::decode(trimmed)
            .map_err(|err| DbError::Encryption(format!("encryption key is not hex: {err}")))?;
        if key.len() != KEY_BYTES {
            return Err(DbError::Encryption(format!(
                "encryption key must be {KEY_BYTES} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|err| DbError::Encryption(err.to_string()))?;
        let digest = Sha256::digest(trimmed.to_ascii_lowercase().as_bytes());
        let key_id = hex::encode(&digest[.. KEY_ID_BYTES]);
        Ok(Self {
            cipher,
            key_id,
        })
    }

    /// Generates a new random key in the hex form accepted by [`Encryptor::new`].
    #[must_use]
    pub fn generate_key() -> String {
        let mut key = [0_u8; KEY_BYTES];
        OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }

    /// Returns the key fingerprint prefixed to ciphertexts.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypts a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Encryption`] when sealing fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, DbError> {
        let mut nonce_bytes = [0_u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| DbError::Encryption("failed to seal value".to_string()))?;
        let mut payload = Vec::with_capacity(NONCE_BYTES + sealed.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&sealed);
        Ok(format!("{}{}", self.key_id, hex::encode(payload)))
    }

    /// Decrypts a value produced by [`Encryptor::encrypt`] with the same key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decryption`] when the key id does not match, the
    /// payload is malformed, or authentication fails.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, DbError> {
        let Some(body) = ciphertext.strip_prefix(self.key_id.as_str()) else {
            return Err(DbError::Decryption(format!(
                "value was not encrypted with key {}",
                self.key_id
            )));
        };
        let payload = hex::decode(body)
            .map_err(|err| DbError::Decryption(format!("ciphertext is not hex: {err}")))?;
        if payload.len() < NONCE_BYTES {
            return Err(DbError::Decryption("ciphertext shorter than nonce".to_string()));
        }
        let (nonce_bytes, sealed) = payload.split_at(NONCE_BYTES);
        let opened = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| DbError::Decryption("ciphertext authentication failed".to_string()))?;
        String::from_utf8(opened)
            .map_err(|_| DbError::Decryption("plaintext is not utf-8".to_string()))
    }

    /// Returns true when the value carries this key's id prefix.
    ///
    /// This is a cheap check; it does not authenticate the payload.
    #[must_use]
    pub fn decryptable(&self, ciphertext: &str) -> bool {
        ciphertext.starts_with(self.key_id.as_str())
    }
}

impl fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryptor").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
