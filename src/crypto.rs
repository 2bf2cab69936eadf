//! Credential encryption (AES-256-CTR)
//!
//! API keys are encrypted at rest with a process-wide 32-byte key and a fresh
//! random 16-byte IV per call. Both halves are hex-encoded, matching the
//! `aes-256-ctr` records written by the web frontend's save endpoint.
//!
//! CTR mode has no authentication tag: decrypting with the wrong key yields
//! garbage rather than an error. Use [`looks_like_api_key`] before trusting a
//! decrypted value.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{Result, SyncError};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// IV length in bytes (one AES block)
pub const IV_LEN: usize = 16;

/// Environment variable holding the encryption key
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";

/// Process-wide encryption key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Build a key from exactly 32 raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            SyncError::Configuration(format!(
                "encryption key must be exactly {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Parse a configured key.
    ///
    /// Accepts either 64 hex characters or a 32-character string used as raw
    /// bytes (the format Node's `createCipheriv` consumes).
    /// The value is used exactly as given; surrounding whitespace is a
    /// configuration error rather than something to trim away.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim() != raw {
            return Err(SyncError::Configuration(
                "encryption key has leading or trailing whitespace".to_string(),
            ));
        }
        if raw.len() == KEY_LEN * 2 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            let mut bytes = hex::decode(raw)
                .map_err(|e| SyncError::Configuration(format!("invalid hex key: {e}")))?;
            let key = Self::from_bytes(&bytes);
            bytes.zeroize();
            return key;
        }
        Self::from_bytes(raw.as_bytes())
    }

    /// Load the key from `ENCRYPTION_KEY`. Call once at startup.
    pub fn from_env() -> Result<Self> {
        let mut raw = std::env::var(ENCRYPTION_KEY_ENV).map_err(|_| {
            SyncError::Configuration(format!("{ENCRYPTION_KEY_ENV} is not set"))
        })?;
        let key = Self::parse(&raw);
        raw.zeroize();
        key
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// At-rest representation of an API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSecret {
    /// Hex-encoded ciphertext. Older records call this `hash`.
    #[serde(alias = "hash")]
    pub ciphertext: String,
    /// Hex-encoded 16-byte IV. Not secret.
    pub init_vector: String,
}

impl EncryptedSecret {
    pub fn decrypt(&self, key: &EncryptionKey) -> Result<String> {
        decrypt(&self.ciphertext, &self.init_vector, key)
    }
}

/// Encrypt a secret under `key` with a fresh random IV
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<EncryptedSecret> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let mut buffer = plaintext.as_bytes().to_vec();
    let mut cipher = Aes256Ctr::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| SyncError::Configuration(format!("cipher init failed: {e}")))?;
    cipher.apply_keystream(&mut buffer);

    Ok(EncryptedSecret {
        ciphertext: hex::encode(&buffer),
        init_vector: hex::encode(iv),
    })
}

/// Decrypt a hex ciphertext with its hex IV.
///
/// Fails on malformed hex, a wrong-sized IV or an empty ciphertext. A wrong
/// key is NOT detected; the result is then arbitrary text.
pub fn decrypt(ciphertext: &str, init_vector: &str, key: &EncryptionKey) -> Result<String> {
    let iv = hex::decode(init_vector)
        .map_err(|e| SyncError::Decryption(format!("invalid IV hex: {e}")))?;
    if iv.len() != IV_LEN {
        return Err(SyncError::Decryption(format!(
            "IV must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }

    let mut buffer = hex::decode(ciphertext)
        .map_err(|e| SyncError::Decryption(format!("invalid ciphertext hex: {e}")))?;
    if buffer.is_empty() {
        return Err(SyncError::Decryption("ciphertext is empty".to_string()));
    }

    let mut cipher = Aes256Ctr::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| SyncError::Decryption(format!("cipher init failed: {e}")))?;
    cipher.apply_keystream(&mut buffer);

    let plaintext = String::from_utf8_lossy(&buffer).into_owned();
    buffer.zeroize();
    Ok(plaintext)
}

/// Cheap shape check for a decrypted API key.
///
/// Linear (`lin_api_...`) and GitHub (`ghp_...`, `gho_...`) tokens are long
/// runs of printable ASCII without whitespace.
pub fn looks_like_api_key(candidate: &str) -> bool {
    (8..=256).contains(&candidate.len())
        && candidate.chars().all(|c| c.is_ascii_graphic())
}
