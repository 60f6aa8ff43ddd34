//! Gossip wire format, version 1.
//!
//! Inbound bodies are parsed into domain records before anything else looks
//! at them. Parsing checks shape only (fields present, base64 and decimal
//! well formed, integers within `u128`). Admission is a separate step.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::{ContentHash, HashParseError};
use crate::encoding::{base64_bytes, decimal};
use crate::pow::Nonce;
use crate::store::{GossipObject, Peer};
use crate::time::Timestamp;

/// Why an inbound body or path segment was refused.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("malformed hash: {0}")]
    Hash(#[from] HashParseError),
}

/// Body of `POST /gossip`. Any `receiveTime` the sender includes is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSubmission {
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(with = "decimal")]
    pub nonce: Nonce,
    #[serde(with = "decimal")]
    pub expiration_time: Timestamp,
}

impl ObjectSubmission {
    /// Stamps the submission with the local receive time.
    pub fn into_object(self, receive_time: Timestamp) -> GossipObject {
        GossipObject {
            payload: self.payload,
            nonce: self.nonce,
            expiration_time: self.expiration_time,
            receive_time,
        }
    }
}

impl From<&GossipObject> for ObjectSubmission {
    fn from(object: &GossipObject) -> Self {
        Self {
            payload: object.payload.clone(),
            nonce: object.nonce,
            expiration_time: object.expiration_time,
        }
    }
}

/// Parses a submitted (or fetched) object, stamping it as received now.
pub fn parse_object(body: &[u8], receive_time: Timestamp) -> Result<GossipObject, WireError> {
    let submission: ObjectSubmission = serde_json::from_slice(body)?;
    Ok(submission.into_object(receive_time))
}

/// Parses a peer record from a `POST /peers` body or a `/peers` frame.
pub fn parse_peer(body: &[u8]) -> Result<Peer, WireError> {
    Ok(serde_json::from_slice(body)?)
}

/// Parses a hash from a URL segment or a `/gossip` frame.
pub fn parse_hash(text: &str) -> Result<ContentHash, WireError> {
    Ok(ContentHash::from_hex(text.trim())?)
}

/// Encodes a peer as a `/peers` frame.
pub fn encode_peer(peer: &Peer) -> Result<String, WireError> {
    Ok(serde_json::to_string(peer)?)
}
