//! # Identity Key Material
//!
//! Every Agora identity owns two keys:
//!
//! - an **Ed25519** signing key, which authenticates every message it sends;
//! - an **X25519** static secret, which opens sealed boxes addressed to it.
//!
//! The public halves of both travel together as a [`PublicHalf`]. That pair
//! is what correspondents store as a contact and what a direct message is
//! addressed to.
//!
//! Secrets never appear in `Debug` output. Serialization exists solely for
//! the node's local snapshot file. Every key is a fixed-length hex string,
//! and a snapshot whose public keys do not match its secrets is rejected.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::config::{ENCRYPTION_KEY_LENGTH, SIGNATURE_LENGTH, SIGNING_KEY_LENGTH};
use crate::encoding::hex_array;

/// Errors in key handling.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keypair validation failed: public key does not match secret key")]
    KeypairMismatch,
}

// ---------------------------------------------------------------------------
// PublicHalf
// ---------------------------------------------------------------------------

/// The shareable half of an identity: signing and encryption public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicHalf {
    #[serde(with = "hex_array")]
    pub public_signing_key: [u8; SIGNING_KEY_LENGTH],
    #[serde(with = "hex_array")]
    pub public_encryption_key: [u8; ENCRYPTION_KEY_LENGTH],
}

impl PublicHalf {
    /// `publicSigningKey || publicEncryptionKey`, the input to the
    /// public-half recipient digest.
    pub fn concatenated(&self) -> [u8; SIGNING_KEY_LENGTH + ENCRYPTION_KEY_LENGTH] {
        let mut out = [0u8; SIGNING_KEY_LENGTH + ENCRYPTION_KEY_LENGTH];
        out[..SIGNING_KEY_LENGTH].copy_from_slice(&self.public_signing_key);
        out[SIGNING_KEY_LENGTH..].copy_from_slice(&self.public_encryption_key);
        out
    }
}

// ---------------------------------------------------------------------------
// IdentityKeyPair
// ---------------------------------------------------------------------------

/// Full key material of a local identity.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "KeyPairRepr", into = "KeyPairRepr")]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
    encryption_secret: StaticSecret,
}

impl IdentityKeyPair {
    /// Generates fresh signing and encryption keys from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            encryption_secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Rebuilds a keypair from its two 32-byte secrets.
    pub fn from_secret_bytes(signing: &[u8; 32], encryption: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(signing),
            encryption_secret: StaticSecret::from(*encryption),
        }
    }

    pub fn public_signing_key(&self) -> [u8; SIGNING_KEY_LENGTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_encryption_key(&self) -> [u8; ENCRYPTION_KEY_LENGTH] {
        X25519PublicKey::from(&self.encryption_secret).to_bytes()
    }

    pub fn public_half(&self) -> PublicHalf {
        PublicHalf {
            public_signing_key: self.public_signing_key(),
            public_encryption_key: self.public_encryption_key(),
        }
    }

    /// Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn encryption_secret(&self) -> &StaticSecret {
        &self.encryption_secret
    }

    pub fn signing_secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn encryption_secret_bytes(&self) -> [u8; 32] {
        self.encryption_secret.to_bytes()
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IdentityKeyPair(sign={}, enc={})",
            hex::encode(self.public_signing_key()),
            hex::encode(self.public_encryption_key())
        )
    }
}

impl PartialEq for IdentityKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public_half() == other.public_half()
    }
}

impl Eq for IdentityKeyPair {}

/// Snapshot form of a keypair.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPairRepr {
    #[serde(with = "hex_array")]
    public_signing_key: [u8; 32],
    #[serde(with = "hex_array")]
    private_signing_key: [u8; 32],
    #[serde(with = "hex_array")]
    public_encryption_key: [u8; 32],
    #[serde(with = "hex_array")]
    private_encryption_key: [u8; 32],
}

impl From<IdentityKeyPair> for KeyPairRepr {
    fn from(pair: IdentityKeyPair) -> Self {
        Self {
            public_signing_key: pair.public_signing_key(),
            private_signing_key: pair.signing_secret_bytes(),
            public_encryption_key: pair.public_encryption_key(),
            private_encryption_key: pair.encryption_secret_bytes(),
        }
    }
}

impl TryFrom<KeyPairRepr> for IdentityKeyPair {
    type Error = KeyError;

    fn try_from(repr: KeyPairRepr) -> Result<Self, Self::Error> {
        let pair = Self::from_secret_bytes(&repr.private_signing_key, &repr.private_encryption_key);
        if pair.public_signing_key() != repr.public_signing_key
            || pair.public_encryption_key() != repr.public_encryption_key
        {
            return Err(KeyError::KeypairMismatch);
        }
        Ok(pair)
    }
}
