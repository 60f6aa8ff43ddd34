//! Plaintext encoding and encryption of signed messages.
//!
//! The plaintext is JSON carrying an explicit format version:
//!
//! ```text
//! {"version": 1, "signed": {publicHalf, message, signature, recipientDigest}}
//! ```
//!
//! Every binary field is fixed-length hex, so a truncated key or signature
//! fails to decode rather than reaching signature verification.
//!
//! Opening never errors. Trial decryption hits the wrong key far more often
//! than the right one, so every failure mode (AEAD mismatch, bad JSON, wrong
//! version, failed validation) collapses into `None`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{sign, validate, Message, Recipient, SignedMessage};
use crate::config::{AES_KEY_LENGTH, MESSAGE_FORMAT_VERSION};
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::keys::{IdentityKeyPair, PublicHalf};
use crate::crypto::sealed::{self, SealError};
use crate::time::Timestamp;

/// Errors on the sealing side. Opening reports "no match" instead.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Symmetric(#[from] EncryptionError),

    #[error(transparent)]
    Sealed(#[from] SealError),
}

#[derive(Serialize, Deserialize)]
struct Plaintext {
    version: u32,
    signed: SignedMessage,
}

fn encode(signed: &SignedMessage) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(&Plaintext {
        version: MESSAGE_FORMAT_VERSION,
        signed: signed.clone(),
    })?)
}

fn decode(bytes: &[u8]) -> Option<SignedMessage> {
    let plaintext: Plaintext = serde_json::from_slice(bytes).ok()?;
    (plaintext.version == MESSAGE_FORMAT_VERSION).then_some(plaintext.signed)
}

// ---------------------------------------------------------------------------
// Symmetric (group) mode
// ---------------------------------------------------------------------------

/// Encrypts a signed message under a group key: `ciphertext || nonce`.
pub fn encrypt_symmetric(
    key: &[u8; AES_KEY_LENGTH],
    signed: &SignedMessage,
) -> Result<Vec<u8>, CodecError> {
    Ok(encryption::encrypt(key, &encode(signed)?)?)
}

/// Inverse of [`encrypt_symmetric`]; `None` on any mismatch.
pub fn decrypt_symmetric(key: &[u8; AES_KEY_LENGTH], ciphertext: &[u8]) -> Option<SignedMessage> {
    decode(&encryption::decrypt(key, ciphertext).ok()?)
}

// ---------------------------------------------------------------------------
// Asymmetric (sealed box) mode
// ---------------------------------------------------------------------------

/// Seals a signed message to a public half. The sender stays anonymous at
/// this layer.
pub fn encrypt_asymmetric(
    recipient: &PublicHalf,
    signed: &SignedMessage,
) -> Result<Vec<u8>, CodecError> {
    Ok(sealed::seal(&recipient.public_encryption_key, &encode(signed)?)?)
}

/// Inverse of [`encrypt_asymmetric`]; `None` on any mismatch.
pub fn decrypt_asymmetric(pair: &IdentityKeyPair, ciphertext: &[u8]) -> Option<SignedMessage> {
    decode(&sealed::open(pair.encryption_secret(), ciphertext)?)
}

// ---------------------------------------------------------------------------
// Sign-and-seal / open-and-validate
// ---------------------------------------------------------------------------

/// Signs `text` for a group and encrypts it under the group key.
pub fn seal_for_group(
    author: &IdentityKeyPair,
    name: &str,
    key: &[u8; AES_KEY_LENGTH],
    text: &str,
) -> Result<Vec<u8>, CodecError> {
    let recipient = Recipient::UnmoderatedGroup {
        name: name.to_owned(),
        key: *key,
    };
    encrypt_symmetric(key, &sign(author, text, &recipient))
}

/// Signs `text` for a single identity and seals it to them.
pub fn seal_for_public_half(
    author: &IdentityKeyPair,
    recipient: &PublicHalf,
    text: &str,
) -> Result<Vec<u8>, CodecError> {
    encrypt_asymmetric(recipient, &sign(author, text, &Recipient::PublicHalf(*recipient)))
}

/// Tries a payload against one group key.
pub fn open_for_group(
    name: &str,
    key: &[u8; AES_KEY_LENGTH],
    payload: &[u8],
    receive_time: Timestamp,
) -> Option<Message> {
    let signed = decrypt_symmetric(key, payload)?;
    let recipient = Recipient::UnmoderatedGroup {
        name: name.to_owned(),
        key: *key,
    };
    validate(&signed, &recipient, receive_time).ok()
}

/// Tries a payload against an identity's own keypair.
pub fn open_for_identity(
    pair: &IdentityKeyPair,
    payload: &[u8],
    receive_time: Timestamp,
) -> Option<Message> {
    let signed = decrypt_asymmetric(pair, payload)?;
    validate(&signed, &Recipient::PublicHalf(pair.public_half()), receive_time).ok()
}
