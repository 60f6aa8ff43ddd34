//! # Protocol Configuration & Constants
//!
//! Every magic number in Agora lives here. Puzzle difficulty, sweep cadences,
//! wire limits and the bootstrap sentinels all have to agree across every
//! node on the network, so nobody gets to redefine them locally.
//!
//! Runtime-tunable knobs (listen address, bootstrap list, intervals used by
//! tests) live in [`NodeConfig`] instead.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version reported by `/status` and `version`.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version tag embedded in every signed-message plaintext. Decoders reject
/// anything else outright.
pub const MESSAGE_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 public key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// X25519 public key length in bytes.
pub const ENCRYPTION_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// BLAKE3 output length used for every content hash.
pub const HASH_LENGTH: usize = 32;

/// AES-256-GCM key size (group keys are exactly this long).
pub const AES_KEY_LENGTH: usize = 32;

/// AES-GCM nonce size. 96 bits, the only size GCM handles natively.
pub const AES_NONCE_LENGTH: usize = 12;

/// Domain-separation context for the sealed-box key derivation.
pub const SEALED_BOX_CONTEXT: &str = "agora sealed box v1";

// ---------------------------------------------------------------------------
// Proof of Work
// ---------------------------------------------------------------------------

/// Trials demanded per payload byte.
pub const NONCE_TRIALS_PER_BYTE: u128 = 1;

/// Fixed overhead added to every payload length so tiny payloads are not free.
pub const PAYLOAD_LENGTH_EXTRA_BYTES: u128 = 1000;

/// Divisor applied to `ttl * length` in the target formula (2^16).
pub const TTL_DIVISOR: u128 = 1 << 16;

/// Argon2id memory cost in KiB. The smallest value the algorithm accepts.
pub const POW_MEMORY_KIB: u32 = 8;

/// Argon2id pass count.
pub const POW_ITERATIONS: u32 = 1;

/// Argon2id lanes.
pub const POW_PARALLELISM: u32 = 1;

/// Bytes of Argon2id output per trial. Only the first 8 are compared.
pub const POW_OUTPUT_LENGTH: usize = 16;

/// Fixed all-zero salt. The puzzle is a work factor, not a password hash.
pub const POW_SALT: [u8; 16] = [0u8; 16];

/// How many trials run between checks of the cancellation flag.
pub const POW_CANCEL_CHECK_INTERVAL: u128 = 64;

/// Peer records pay for `ttl * PEER_TTL_MULTIPLIER` seconds of lifetime,
/// which makes flooding the peer table with fake addresses expensive.
pub const PEER_TTL_MULTIPLIER: u128 = 1000;

/// Longest `host:port` string a peer record may carry.
pub const MAX_ADDRESS_LENGTH: usize = 250;

// ---------------------------------------------------------------------------
// Bootstrap Sentinels
// ---------------------------------------------------------------------------

/// Placeholder nonce carried by trusted seed peers. Never verified.
pub const BOOTSTRAP_NONCE: u128 = 0xdeadbeef;

/// "Never expires". Far beyond any real epoch-seconds value and beyond the
/// range of a 64-bit integer, which is why times are `u128` everywhere.
pub const NEVER_EXPIRES: u128 = 0xdeadc0ffeebadf00dfeedc0de;

// ---------------------------------------------------------------------------
// Gossip Timing
// ---------------------------------------------------------------------------

/// Cadence of the expiry sweep over objects and peers.
pub const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of the reconnection sweep over known peers.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Cadence of self-advertisement.
pub const ADVERTISE_INTERVAL: Duration = Duration::from_secs(60);

/// Lifetime, in seconds, of every self-advertised peer record.
pub const ADVERTISEMENT_TTL: u128 = 120;

/// Timeout for a single fetch/push HTTP request to a peer.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the broadcast channels feeding WebSocket subscribers.
pub const ANNOUNCEMENT_CHANNEL_CAPACITY: usize = 1024;

/// Object offers (HEAD probe, then POST) in flight per connection, counted
/// separately for the connect-time backlog and for live announcements.
pub const OBJECT_PUSH_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Default port for the public gossip server.
pub const DEFAULT_GOSSIP_PORT: u16 = 4010;

/// Default port for the local management API.
pub const DEFAULT_API_PORT: u16 = 4011;

/// Default port for the Prometheus endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 4012;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the gossip server binds to.
    pub listen_addr: SocketAddr,
    /// `host:port` strings under which this node is reachable. Each one is
    /// self-advertised; none of them is ever dialed.
    pub advertised_addresses: Vec<String>,
    /// Seed peers inserted without proof of work at startup.
    pub bootstrap_peers: Vec<String>,
    /// Demote transport failures from `warn` to `trace`.
    pub silence_networking_errors: bool,
    /// Whether to run the self-advertisement loop at all.
    pub advertise: bool,
    /// Cadence of the expiry sweep.
    pub expiry_sweep_interval: Duration,
    /// Cadence of the reconnection sweep.
    pub reconnect_interval: Duration,
    /// Cadence of self-advertisement.
    pub advertise_interval: Duration,
    /// Lifetime of self-advertised peer records, in seconds.
    pub advertisement_ttl: u128,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_GOSSIP_PORT)),
            advertised_addresses: Vec::new(),
            bootstrap_peers: Vec::new(),
            silence_networking_errors: false,
            advertise: true,
            expiry_sweep_interval: EXPIRY_SWEEP_INTERVAL,
            reconnect_interval: RECONNECT_INTERVAL,
            advertise_interval: ADVERTISE_INTERVAL,
            advertisement_ttl: ADVERTISEMENT_TTL,
        }
    }
}
