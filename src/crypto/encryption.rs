//! AES-256-GCM encryption/decryption
//!
//! Provides authenticated encryption for blobs at rest using AES-256-GCM.
//! Each encryption operation generates a unique nonce.
//!
//! Blob layout:
//!
//! ```text
//! +-------+------------+---------------------------+
//! | SBX1  | nonce (12) | ciphertext || tag (16)    |
//! +-------+------------+---------------------------+
//! ```
//!
//! The magic is also bound as associated data, so a blob cannot be
//! reinterpreted under another format version.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};

use crate::error::StoreError;

use super::MasterKey;

/// Magic prefix identifying an encrypted blob (format version 1)
pub const BLOB_MAGIC: &[u8; 4] = b"SBX1";

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes
const TAG_SIZE: usize = 16;

/// Bytes preceding the ciphertext
pub const HEADER_SIZE: usize = BLOB_MAGIC.len() + NONCE_SIZE;

/// Encrypt plaintext into a self-describing blob
pub fn encrypt(plaintext: &[u8], key: &MasterKey) -> Result<Vec<u8>, StoreError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StoreError::EncryptionFailed(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| StoreError::EncryptionFailed(format!("Failed to generate nonce: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: BLOB_MAGIC,
            },
        )
        .map_err(|e| StoreError::EncryptionFailed(format!("Encryption failed: {}", e)))?;

    let mut blob = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    blob.extend_from_slice(BLOB_MAGIC);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`]
///
/// Never returns partial plaintext: a wrong key, a truncated blob or any
/// modified byte fails authentication.
pub fn decrypt(blob: &[u8], key: &MasterKey) -> Result<Vec<u8>, StoreError> {
    if blob.len() >= BLOB_MAGIC.len() && !is_encrypted(blob) {
        return Err(StoreError::InvalidFormat(
            "missing encrypted blob header".to_string(),
        ));
    }
    if blob.len() < HEADER_SIZE + TAG_SIZE {
        return Err(StoreError::DecryptionFailed(format!(
            "ciphertext truncated: {} bytes",
            blob.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StoreError::DecryptionFailed(format!("Failed to create cipher: {}", e)))?;

    let nonce = Nonce::from_slice(&blob[BLOB_MAGIC.len()..HEADER_SIZE]);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &blob[HEADER_SIZE..],
                aad: BLOB_MAGIC,
            },
        )
        .map_err(|_| {
            StoreError::DecryptionFailed("invalid key or corrupted data".to_string())
        })
}

/// Check whether bytes start with the blob header
pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.starts_with(BLOB_MAGIC)
}
