//! # Network Module
//!
//! Epidemic gossip over plain HTTP and WebSockets. There is no routing and
//! no overlay structure: every node dials every peer it knows about, pulls
//! what it is missing, and pushes what the remote lacks.
//!
//! ## Architecture
//!
//! ```text
//! wire.rs        - request/response bodies and their validation
//! server.rs      - axum router for /gossip and /peers, announcement fan-out
//! transport.rs   - reqwest + tokio-tungstenite client for a remote node
//! connection.rs  - one outbound connection and its push/pull tasks
//! service.rs     - GossipService: server, connections, timers, shutdown
//! ```
//!
//! ## Design Decisions
//!
//! - Objects are announced by hash and pulled on demand; peers are small
//!   and are pushed whole.
//! - Duplicates are expected. Nothing at this layer suppresses them; the
//!   stores deduplicate by content hash.
//! - Every inbound record goes through full admission, whether it arrived
//!   by `POST`, by fetch, or on the peer stream.

pub mod connection;
pub mod server;
pub mod service;
pub mod transport;
pub mod wire;

pub use connection::{ConnectionState, PeerConnection};
pub use server::{gossip_router, Announcements, GossipState};
pub use service::GossipService;
pub use transport::GossipClient;
pub use wire::{ObjectSubmission, WireError};

use thiserror::Error;

/// Transport and server failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to bind gossip server: {0}")]
    Bind(std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("{address} answered with status {status}")]
    Status { address: String, status: u16 },

    #[error(transparent)]
    Wire(#[from] WireError),
}
