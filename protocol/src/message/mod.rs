//! # Message Codec
//!
//! Signed envelopes, recipient binding, and the two encryption modes that
//! turn an envelope into an opaque gossip payload.
//!
//! ```text
//! mod.rs       - Recipient, SignedMessage, Message, sign/validate
//! envelope.rs  - versioned plaintext encoding, group and sealed encryption
//! ```
//!
//! ## Recipient binding
//!
//! A signature covers `H(message) || recipient_digest`. For a group the
//! digest is `H(group_key)`, and for a direct message it is
//! `H(public_signing_key || public_encryption_key)`. Validation recomputes
//! the digest from the key that *actually* decrypted the payload. A
//! signed message lifted out of one group and re-encrypted for another
//! therefore fails validation instead of appearing as a forged post.
//!
//! ## Validation order
//!
//! 1. The embedded public half must carry a valid self-signature, i.e. the
//!    signing key vouches for the encryption key.
//! 2. The recipient digest must match the recipient used to decrypt.
//! 3. The outer signature must verify under the embedded signing key.
//!
//! Only then does a [`Message`] exist. Its `signature_hash` is the dedup key
//! for inboxes.

pub mod envelope;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, HASH_LENGTH, SIGNATURE_LENGTH};
use crate::crypto::hash::{generic_hash, ContentHash};
use crate::crypto::keys::{IdentityKeyPair, PublicHalf};
use crate::crypto::signatures;
use crate::encoding::{decimal, hex_array};
use crate::time::Timestamp;

pub use envelope::{
    decrypt_asymmetric, decrypt_symmetric, encrypt_asymmetric, encrypt_symmetric, open_for_group,
    open_for_identity, seal_for_group, seal_for_public_half, CodecError,
};

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Recipient {
    /// Anyone holding the group key.
    #[serde(rename = "unmoderated group")]
    UnmoderatedGroup {
        name: String,
        #[serde(with = "hex_array")]
        key: [u8; AES_KEY_LENGTH],
    },
    /// A single identity.
    #[serde(rename = "public half")]
    PublicHalf(PublicHalf),
}

/// Digest binding a signature to its recipient.
pub fn recipient_digest(recipient: &Recipient) -> [u8; HASH_LENGTH] {
    match recipient {
        Recipient::UnmoderatedGroup { key, .. } => generic_hash(key),
        Recipient::PublicHalf(half) => generic_hash(&half.concatenated()),
    }
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// A public half plus the signing key's signature over the encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPublicHalf {
    #[serde(flatten)]
    pub public_half: PublicHalf,
    #[serde(with = "hex_array")]
    pub signature: [u8; SIGNATURE_LENGTH],
}

impl SignedPublicHalf {
    pub fn sign(pair: &IdentityKeyPair) -> Self {
        let public_half = pair.public_half();
        Self {
            signature: pair.sign(&public_half.public_encryption_key),
            public_half,
        }
    }

    /// The public half, if its self-signature holds.
    pub fn verify(&self) -> Option<PublicHalf> {
        signatures::verify(
            &self.public_half.public_signing_key,
            &self.public_half.public_encryption_key,
            &self.signature,
        )
        .then_some(self.public_half)
    }
}

/// A signed message as carried inside an encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub public_half: SignedPublicHalf,
    pub message: String,
    #[serde(with = "hex_array")]
    pub signature: [u8; SIGNATURE_LENGTH],
    #[serde(with = "hex_array")]
    pub recipient_digest: [u8; HASH_LENGTH],
}

/// A message whose signatures and recipient binding have all checked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub public_half: PublicHalf,
    pub message: String,
    pub signature_hash: ContentHash,
    pub recipient: Recipient,
    #[serde(with = "decimal")]
    pub receive_time: Timestamp,
}

/// Why a signed message failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("public half self-signature is invalid")]
    InvalidPublicHalf,

    #[error("recipient digest does not match the decrypting recipient")]
    RecipientMismatch,

    #[error("message signature is invalid")]
    InvalidSignature,
}

fn signing_input(message: &str, digest: &[u8; HASH_LENGTH]) -> [u8; 2 * HASH_LENGTH] {
    let mut input = [0u8; 2 * HASH_LENGTH];
    input[..HASH_LENGTH].copy_from_slice(&generic_hash(message.as_bytes()));
    input[HASH_LENGTH..].copy_from_slice(digest);
    input
}

/// Signs `message` for `recipient`.
pub fn sign(pair: &IdentityKeyPair, message: &str, recipient: &Recipient) -> SignedMessage {
    let digest = recipient_digest(recipient);
    SignedMessage {
        public_half: SignedPublicHalf::sign(pair),
        message: message.to_owned(),
        signature: pair.sign(&signing_input(message, &digest)),
        recipient_digest: digest,
    }
}

/// Validates `signed` as received by `recipient` at `receive_time`.
pub fn validate(
    signed: &SignedMessage,
    recipient: &Recipient,
    receive_time: Timestamp,
) -> Result<Message, ValidationError> {
    let public_half = signed
        .public_half
        .verify()
        .ok_or(ValidationError::InvalidPublicHalf)?;

    if recipient_digest(recipient) != signed.recipient_digest {
        return Err(ValidationError::RecipientMismatch);
    }

    let input = signing_input(&signed.message, &signed.recipient_digest);
    if !signatures::verify(&public_half.public_signing_key, &input, &signed.signature) {
        return Err(ValidationError::InvalidSignature);
    }

    Ok(Message {
        public_half,
        message: signed.message.clone(),
        signature_hash: ContentHash::from_bytes(generic_hash(&signed.signature)),
        recipient: recipient.clone(),
        receive_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, key: u8) -> Recipient {
        Recipient::UnmoderatedGroup {
            name: name.into(),
            key: [key; 32],
        }
    }

    #[test]
    fn signed_message_validates_for_its_recipient() {
        let pair = IdentityKeyPair::generate();
        let recipient = group("friends", 1);
        let signed = sign(&pair, "hello", &recipient);

        let message = validate(&signed, &recipient, 42).unwrap();
        assert_eq!(message.message, "hello");
        assert_eq!(message.public_half, pair.public_half());
        assert_eq!(message.receive_time, 42);
        assert_eq!(
            message.signature_hash,
            ContentHash::from_bytes(generic_hash(&signed.signature))
        );
    }

    #[test]
    fn group_name_does_not_affect_the_digest() {
        assert_eq!(
            recipient_digest(&group("a", 9)),
            recipient_digest(&group("b", 9))
        );
    }

    #[test]
    fn wrong_recipient_is_rejected() {
        let pair = IdentityKeyPair::generate();
        let signed = sign(&pair, "hello", &group("g", 1));
        assert_eq!(
            validate(&signed, &group("g", 2), 0),
            Err(ValidationError::RecipientMismatch)
        );
        let direct = Recipient::PublicHalf(IdentityKeyPair::generate().public_half());
        assert_eq!(
            validate(&signed, &direct, 0),
            Err(ValidationError::RecipientMismatch)
        );
    }

    #[test]
    fn tampered_text_is_rejected() {
        let pair = IdentityKeyPair::generate();
        let recipient = group("g", 1);
        let mut signed = sign(&pair, "pay alice", &recipient);
        signed.message = "pay mallory".into();
        assert_eq!(
            validate(&signed, &recipient, 0),
            Err(ValidationError::InvalidSignature)
        );
    }

    #[test]
    fn swapped_encryption_key_breaks_the_self_signature() {
        let pair = IdentityKeyPair::generate();
        let recipient = group("g", 1);
        let mut signed = sign(&pair, "hi", &recipient);
        signed.public_half.public_half.public_encryption_key =
            IdentityKeyPair::generate().public_encryption_key();
        assert_eq!(
            validate(&signed, &recipient, 0),
            Err(ValidationError::InvalidPublicHalf)
        );
    }

    #[test]
    fn recipient_tags_match_the_inbox_format() {
        let json = serde_json::to_value(group("g", 0)).unwrap();
        assert_eq!(json["type"], "unmoderated group");
        let direct = Recipient::PublicHalf(IdentityKeyPair::generate().public_half());
        let json = serde_json::to_value(&direct).unwrap();
        assert_eq!(json["type"], "public half");
        assert!(json["publicSigningKey"].is_string());
    }
}
