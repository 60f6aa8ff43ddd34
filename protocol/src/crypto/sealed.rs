//! # Sealed Boxes
//!
//! Anonymous-sender public-key encryption for direct messages. Only the
//! recipient's X25519 public key is needed to seal, and the ciphertext gives
//! away nothing about the sender. (Authentication happens one layer up: the
//! sealed plaintext is itself a signed envelope.)
//!
//! ## Construction
//!
//! 1. Generate an ephemeral X25519 keypair `(e, E)`.
//! 2. `shared = X25519(e, R)` where `R` is the recipient public key.
//! 3. `key = BLAKE3-derive_key(SEALED_BOX_CONTEXT, shared || E || R)`.
//! 4. `nonce = BLAKE3(E || R)[..12]`. Deterministic, and safe because every
//!    box gets a fresh `E` and therefore a fresh key.
//! 5. Output `E || AES-256-GCM(key, nonce, plaintext)`.
//!
//! Running the DH output through BLAKE3's `derive_key` mode rather than using
//! it raw is the same step the X25519 literature always insists on. Curve
//! points are not uniform keys.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, ENCRYPTION_KEY_LENGTH, SEALED_BOX_CONTEXT};

/// Errors that can occur while sealing.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("recipient public key is a low-order point")]
    NonContributory,

    #[error("encryption failed")]
    EncryptFailed,
}

fn derive_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; AES_KEY_LENGTH] {
    let mut material = [0u8; 96];
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral);
    material[64..].copy_from_slice(recipient);
    blake3::derive_key(SEALED_BOX_CONTEXT, &material)
}

fn derive_nonce(ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; AES_NONCE_LENGTH] {
    let digest = crate::crypto::hash::hash_concat(&[&ephemeral[..], &recipient[..]]);
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    nonce.copy_from_slice(&digest[..AES_NONCE_LENGTH]);
    nonce
}

/// Seals `plaintext` to `recipient`.
pub fn seal(recipient: &[u8; ENCRYPTION_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
    let recipient_pk = PublicKey::from(*recipient);
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient_pk);
    if !shared.was_contributory() {
        return Err(SealError::NonContributory);
    }

    let key = derive_key(shared.as_bytes(), ephemeral_pk.as_bytes(), recipient);
    let nonce = derive_nonce(ephemeral_pk.as_bytes(), recipient);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| SealError::EncryptFailed)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| SealError::EncryptFailed)?;

    let mut out = Vec::with_capacity(ENCRYPTION_KEY_LENGTH + ciphertext.len());
    out.extend_from_slice(ephemeral_pk.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Opens a sealed box with the recipient's static secret. `None` covers every
/// failure: too short, wrong recipient, tampered ciphertext.
pub fn open(secret: &StaticSecret, sealed: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < ENCRYPTION_KEY_LENGTH {
        return None;
    }
    let (ephemeral_bytes, ciphertext) = sealed.split_at(ENCRYPTION_KEY_LENGTH);
    let ephemeral: [u8; 32] = ephemeral_bytes.try_into().ok()?;
    let ephemeral_pk = PublicKey::from(ephemeral);
    let own_pk = PublicKey::from(secret);

    let shared = secret.diffie_hellman(&ephemeral_pk);
    if !shared.was_contributory() {
        return None;
    }

    let key = derive_key(shared.as_bytes(), &ephemeral, own_pk.as_bytes());
    let nonce = derive_nonce(&ephemeral, own_pk.as_bytes());
    let cipher = Aes256Gcm::new_from_slice(&key).ok()?;
    cipher.decrypt(Nonce::from_slice(&nonce), ciphertext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (StaticSecret, [u8; 32]) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret).to_bytes();
        (secret, public)
    }

    #[test]
    fn recipient_can_open() {
        let (secret, public) = keypair();
        let sealed = seal(&public, b"for your eyes only").unwrap();
        assert_eq!(open(&secret, &sealed).unwrap(), b"for your eyes only");
    }

    #[test]
    fn other_keys_cannot_open() {
        let (_, public) = keypair();
        let (other, _) = keypair();
        let sealed = seal(&public, b"private").unwrap();
        assert!(open(&other, &sealed).is_none());
    }

    #[test]
    fn tampering_and_truncation_yield_none() {
        let (secret, public) = keypair();
        let mut sealed = seal(&public, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert!(open(&secret, &sealed).is_none());
        assert!(open(&secret, &sealed[..10]).is_none());
    }

    #[test]
    fn low_order_recipient_is_refused() {
        assert!(matches!(
            seal(&[0u8; 32], b"x"),
            Err(SealError::NonContributory)
        ));
    }

    #[test]
    fn each_seal_uses_a_fresh_ephemeral_key() {
        let (_, public) = keypair();
        let a = seal(&public, b"same").unwrap();
        let b = seal(&public, b"same").unwrap();
        assert_ne!(a[..32], b[..32]);
    }
}
