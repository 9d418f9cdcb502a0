//! # Secrets Envelope
//!
//! Upstream auth secrets are persisted as a versioned blob:
//!
//! ```text
//! 0x01 | nonce(12) | ciphertext (AES-256-GCM)
//! ```
//!
//! keyed by `SHA-256(ENCRYPTION_KEY)`. A missing `ENCRYPTION_KEY` disables
//! decryption only — plain config keys are still honored by the auth layer.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The only envelope version currently produced or accepted.
const ENVELOPE_VERSION: u8 = 0x01;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Errors raised by envelope sealing/opening.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The blob is too short to carry a version and nonce.
    #[error("invalid secrets envelope")]
    InvalidEnvelope,
    /// The version byte is not recognized.
    #[error("unsupported secrets envelope version {0:#04x}")]
    UnsupportedVersion(u8),
    /// Authenticated decryption failed (wrong key or corrupted blob).
    #[error("secrets decryption failed")]
    Decrypt,
    /// Encryption failed.
    #[error("secrets encryption failed")]
    Encrypt,
    /// The decrypted payload is not a JSON object.
    #[error("secrets payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Derive the AES-256 key from the configured encryption key string.
fn derive_key(encryption_key: &str) -> [u8; 32] {
    Sha256::digest(encryption_key.as_bytes()).into()
}

/// Seal a secrets object into a versioned envelope.
pub fn seal_envelope(secrets: &Value, encryption_key: &str) -> Result<Vec<u8>, SecretsError> {
    let key = derive_key(encryption_key);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let plaintext = serde_json::to_vec(secrets)?;
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|_| SecretsError::Encrypt)?;

    let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    blob.push(ENVELOPE_VERSION);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a versioned envelope and parse the secrets object.
pub fn open_envelope(blob: &[u8], encryption_key: &str) -> Result<Value, SecretsError> {
    if blob.len() < 2 {
        return Err(SecretsError::InvalidEnvelope);
    }
    if blob[0] != ENVELOPE_VERSION {
        return Err(SecretsError::UnsupportedVersion(blob[0]));
    }
    if blob.len() < 1 + NONCE_LEN {
        return Err(SecretsError::InvalidEnvelope);
    }
    let key = derive_key(encryption_key);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&blob[1..1 + NONCE_LEN]);
    let plaintext = cipher
        .decrypt(nonce, &blob[1 + NONCE_LEN..])
        .map_err(|_| SecretsError::Decrypt)?;
    Ok(serde_json::from_slice(&plaintext)?)
}
