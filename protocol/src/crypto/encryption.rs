//! # Symmetric Encryption (AES-256-GCM)
//!
//! Group traffic is sealed under the group's 32-byte key with AES-256-GCM.
//! A fresh random 96-bit nonce is drawn per message and appended to the
//! ciphertext:
//!
//! ```text
//! ciphertext || tag (16) || nonce (12)
//! ```
//!
//! Nonce reuse under one key is the one mistake GCM never forgives. Random
//! nonces are safe up to roughly 2^32 messages per key. Groups are nowhere
//! near that.
//!
//! Decryption failure is the *common* case here. The inbox projector tries
//! every group key against every object, so a wrong key is routine.
//! [`decrypt`] still reports it as an error; the codec layer turns it into
//! "no match".

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors that can occur during symmetric encryption or decryption.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short: must be at least {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// Generates a random group key.
pub fn generate_key() -> [u8; AES_KEY_LENGTH] {
    let mut key = [0u8; AES_KEY_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Encrypts `plaintext` under `key`, returning `ciphertext || nonce`.
pub fn encrypt(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut out = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;
    out.extend_from_slice(&nonce_bytes);
    Ok(out)
}

/// Inverse of [`encrypt`].
pub fn decrypt(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (ciphertext, nonce_bytes) = data.split_at(data.len() - AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_appended() {
        let key = generate_key();
        let out = encrypt(&key, b"hello").unwrap();
        // 5 bytes plaintext + 16 tag + 12 nonce
        assert_eq!(out.len(), 5 + 16 + AES_NONCE_LENGTH);
        assert_eq!(decrypt(&key, &out).unwrap(), b"hello");
    }

    #[test]
    fn wrong_key_fails() {
        let out = encrypt(&generate_key(), b"secret").unwrap();
        assert!(matches!(
            decrypt(&generate_key(), &out),
            Err(EncryptionError::DecryptFailed)
        ));
    }

    #[test]
    fn short_input_fails_cleanly() {
        assert!(matches!(
            decrypt(&generate_key(), &[0u8; 5]),
            Err(EncryptionError::CiphertextTooShort)
        ));
        assert!(decrypt(&generate_key(), &[0u8; 12]).is_err());
    }

    #[test]
    fn fresh_nonce_per_call() {
        let key = generate_key();
        assert_ne!(encrypt(&key, b"x").unwrap(), encrypt(&key, b"x").unwrap());
    }
}
