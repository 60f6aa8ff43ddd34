//! # Identity Module
//!
//! Local identities and everything hanging off them. Nothing in here ever
//! touches the network directly; identities only *consume* the object pool.
//!
//! The identity stack is layered:
//!
//! 1. **Identity**: a named keypair owned by this node.
//! 2. **Groups**: unmoderated groups, where membership is nothing more than
//!    possession of a symmetric key. No member list, no moderator.
//! 3. **Contacts**: local aliases for a correspondent's public half.
//! 4. **Inbox**: every message the identity can decrypt and validate,
//!    deduplicated by signature hash.
//!
//! ```text
//! registry.rs  - IdentityRegistry: the shared, observable identity set
//! inbox.rs     - InboxProjector: trial decryption of the object pool
//! ```
//!
//! ## Design Decisions
//!
//! - The inbox is a *projection*. Given the same objects and keys it always
//!   produces the same contents, in any order. Gaining a key (new identity,
//!   new group) simply re-runs the projection over the current pool.
//! - Leaving a group does not retract messages already in the inbox.

pub mod inbox;
pub mod registry;

pub use inbox::{project_object, InboxProjector, Keyring};
pub use registry::{IdentityEvent, IdentityRegistry};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AES_KEY_LENGTH;
use crate::crypto::hash::ContentHash;
use crate::crypto::keys::{IdentityKeyPair, PublicHalf};
use crate::encoding::hex_array;
use crate::message::Message;

/// Errors from identity management.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity not found: {0}")]
    IdentityNotFound(Uuid),

    #[error("group not found")]
    GroupNotFound,

    #[error("contact not found: {0}")]
    ContactNotFound(Uuid),
}

/// A group defined by nothing but its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmoderatedGroup {
    pub name: String,
    #[serde(with = "hex_array")]
    pub key: [u8; AES_KEY_LENGTH],
}

/// A named correspondent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub public_half: PublicHalf,
}

/// Messages in arrival order plus a signature-hash index for dedup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Message>", into = "Vec<Message>")]
pub struct Inbox {
    messages: Vec<Message>,
    seen: HashSet<ContentHash>,
}

impl Inbox {
    /// Adds `message` unless one with the same signature hash is present.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.signature_hash) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, signature_hash: &ContentHash) -> bool {
        self.seen.contains(signature_hash)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<Message>> for Inbox {
    fn from(messages: Vec<Message>) -> Self {
        let mut inbox = Inbox::default();
        for message in messages {
            inbox.insert(message);
        }
        inbox
    }
}

impl From<Inbox> for Vec<Message> {
    fn from(inbox: Inbox) -> Self {
        inbox.messages
    }
}

/// A local identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub key_pair: IdentityKeyPair,
    #[serde(default)]
    pub groups: Vec<UnmoderatedGroup>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub inbox: Inbox,
}

impl Identity {
    /// A fresh identity with newly generated keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            key_pair: IdentityKeyPair::generate(),
            groups: Vec::new(),
            contacts: Vec::new(),
            inbox: Inbox::default(),
        }
    }

    pub fn public_half(&self) -> PublicHalf {
        self.key_pair.public_half()
    }

    pub fn group(&self, key: &[u8; AES_KEY_LENGTH]) -> Option<&UnmoderatedGroup> {
        self.groups.iter().find(|group| &group.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{sign, validate, Recipient};

    fn message(pair: &IdentityKeyPair, text: &str) -> Message {
        let recipient = Recipient::PublicHalf(pair.public_half());
        validate(&sign(pair, text, &recipient), &recipient, 0).unwrap()
    }

    #[test]
    fn inbox_deduplicates_by_signature_hash() {
        let pair = IdentityKeyPair::generate();
        let m = message(&pair, "once");
        let mut inbox = Inbox::default();
        assert!(inbox.insert(m.clone()));
        assert!(!inbox.insert(m.clone()));
        assert_eq!(inbox.len(), 1);
        assert!(inbox.contains(&m.signature_hash));
    }

    #[test]
    fn identity_snapshot_round_trip_rebuilds_the_index() {
        let mut identity = Identity::new("alice");
        identity.groups.push(UnmoderatedGroup {
            name: "g".into(),
            key: [3u8; 32],
        });
        let m = message(&identity.key_pair, "hi");
        identity.inbox.insert(m.clone());

        let json = serde_json::to_string(&identity).unwrap();
        let mut back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);
        assert!(!back.inbox.insert(m));
    }
}
