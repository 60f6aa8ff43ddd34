//! # Hashing Utilities
//!
//! Agora has exactly one hash function: BLAKE3. It is the "generic hash" used
//! for content addressing, recipient digests, the proof-of-work initial hash
//! and signature dedup keys.
//!
//! ## Content addressing
//!
//! Objects and peers are addressed by `H(H(body) || H(expiration))`, where
//! `body` is the payload or the address and `expiration` is hashed as its
//! 16-byte big-endian encoding. Nonces and receive times stay out of the
//! hash, so two independently-mined copies of the same record collapse into
//! one entry.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::HASH_LENGTH;
use crate::time::Timestamp;

/// Errors from parsing a hex-encoded hash.
#[derive(Debug, Error, PartialEq)]
pub enum HashParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("expected {HASH_LENGTH} bytes, got {0}")]
    WrongLength(usize),
}

/// A 32-byte BLAKE3 digest used as a content address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LENGTH]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let bytes = hex::decode(s)?;
        let len = bytes.len();
        let arr: [u8; HASH_LENGTH] = bytes
            .try_into()
            .map_err(|_| HashParseError::WrongLength(len))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// BLAKE3 of `data`.
pub fn generic_hash(data: &[u8]) -> [u8; HASH_LENGTH] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 over the concatenation of `parts`, without materializing it.
pub fn hash_concat(parts: &[&[u8]]) -> [u8; HASH_LENGTH] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Canonical byte form of a timestamp wherever one is hashed or mined over.
pub fn timestamp_bytes(t: Timestamp) -> [u8; 16] {
    t.to_be_bytes()
}

/// Content address of a record: `H(H(body) || H(expiration))`.
pub fn record_hash(body: &[u8], expiration_time: Timestamp) -> ContentHash {
    let body_hash = generic_hash(body);
    let expiration_hash = generic_hash(&timestamp_bytes(expiration_time));
    ContentHash(hash_concat(&[&body_hash[..], &expiration_hash[..]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_hash_depends_on_body_and_expiration() {
        let a = record_hash(b"payload", 100);
        assert_eq!(a, record_hash(b"payload", 100));
        assert_ne!(a, record_hash(b"payload", 101));
        assert_ne!(a, record_hash(b"payloae", 100));
    }

    #[test]
    fn hash_concat_matches_contiguous_hash() {
        assert_eq!(hash_concat(&[&b"ab"[..], &b"cd"[..]]), generic_hash(b"abcd"));
    }

    #[test]
    fn hex_round_trip_and_rejections() {
        let h = record_hash(b"x", 1);
        let parsed: ContentHash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
        assert_eq!(
            ContentHash::from_hex("abcd"),
            Err(HashParseError::WrongLength(2))
        );
        assert!(matches!(
            ContentHash::from_hex("zz"),
            Err(HashParseError::InvalidHex(_))
        ));
    }
}
