//! # Digital Signatures
//!
//! Ed25519 verification against raw key and signature bytes, as they arrive
//! inside decrypted message envelopes.
//!
//! ## Strictness
//!
//! We use `ed25519-dalek`'s strict verification. It rejects small-order keys
//! and non-canonical encodings that lenient implementations accept, which
//! matters here because every byte of a received envelope is attacker-chosen.

use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};
use thiserror::Error;

use crate::config::{SIGNATURE_LENGTH, SIGNING_KEY_LENGTH};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Verifies an Ed25519 signature given as raw bytes.
pub fn verify_raw(
    public_key_bytes: &[u8; SIGNING_KEY_LENGTH],
    message: &[u8],
    signature_bytes: &[u8; SIGNATURE_LENGTH],
) -> Result<(), SignatureError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key_bytes).map_err(|_| SignatureError::InvalidPublicKey)?;

    let signature = DalekSignature::from_bytes(signature_bytes);

    verifying_key
        .verify_strict(message, &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Boolean form of [`verify_raw`].
pub fn verify(
    public_key_bytes: &[u8; SIGNING_KEY_LENGTH],
    message: &[u8],
    signature_bytes: &[u8; SIGNATURE_LENGTH],
) -> bool {
    verify_raw(public_key_bytes, message, signature_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::IdentityKeyPair;

    #[test]
    fn valid_signature_verifies() {
        let pair = IdentityKeyPair::generate();
        let sig = pair.sign(b"agora");
        assert!(verify(&pair.public_signing_key(), b"agora", &sig));
    }

    #[test]
    fn tampered_message_or_key_fails() {
        let pair = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();
        let sig = pair.sign(b"agora");
        assert!(!verify(&pair.public_signing_key(), b"agorb", &sig));
        assert!(!verify(&other.public_signing_key(), b"agora", &sig));
    }

    #[test]
    fn garbage_key_is_rejected() {
        let sig = [0u8; 64];
        // Not every 32-byte string decompresses to a curve point; all 0xff does not.
        assert!(matches!(
            verify_raw(&[0xffu8; 32], b"m", &sig),
            Err(SignatureError::InvalidPublicKey) | Err(SignatureError::VerificationFailed)
        ));
    }
}
