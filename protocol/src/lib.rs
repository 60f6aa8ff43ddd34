// Copyright (c) 2026 The Agora Developers. MIT License.
// See LICENSE for details.

//! # Agora Protocol - Core Library
//!
//! Agora is a Bitmessage-style messaging network with no servers, no
//! accounts and no routing. Nodes swap small, expiring, proof-of-work-stamped
//! blobs with everyone they know. Each node then tries every blob against
//! every key it holds, and whatever opens ends up in an inbox.
//!
//! Nobody on the wire can tell who a blob is for. Not even its recipient
//! can, until the decryption succeeds.
//!
//! ## Architecture
//!
//! - **pow** - Argon2id puzzle whose difficulty scales with size and lifetime.
//! - **store** - Content-addressed, expiring object and peer repositories.
//! - **network** - HTTP/WebSocket gossip: server, connections, timers.
//! - **crypto** - Hashing, Ed25519, AES-256-GCM and an X25519 sealed box.
//! - **message** - Signed envelopes bound to their recipient.
//! - **identity** - Local identities, groups, contacts and the inbox projector.
//! - **node** - `AgoraNode`, the context that owns all of the above.
//! - **config** - Protocol constants and node configuration.
//!
//! ## Design Philosophy
//!
//! 1. Silence is a feature. Rejected submissions get a 200 and failed
//!    decryptions are not errors.
//! 2. The inbox is derived state. Throw it away and it comes back.
//! 3. Proof of work is the only rate limit. Long lifetimes cost more.

pub mod config;
pub mod crypto;
pub mod encoding;
pub mod identity;
pub mod message;
pub mod network;
pub mod node;
pub mod pow;
pub mod store;
pub mod time;

pub use node::{AgoraNode, NodeError};
