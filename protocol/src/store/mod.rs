//! # Object & Peer Stores
//!
//! Content-addressed, expiring, in-memory sets for the two kinds of records
//! the gossip network moves around:
//!
//! ```text
//! object.rs      - GossipObject: an opaque PoW-stamped payload
//! peer.rs        - Peer: a PoW-stamped `host:port` advertisement
//! repository.rs  - Repository<T>: admission, lookup, expiry, listeners
//! ```
//!
//! ## Design Decisions
//!
//! - One generic repository serves both record kinds. Each record type states
//!   its own admission rule through [`Record::check_admission`]; the repository
//!   owns deduplication and bookkeeping.
//! - The item set and its hash index share one `parking_lot::RwLock`, so no
//!   reader can ever see one updated without the other.
//! - Change listeners are explicit closures registered with `subscribe` and
//!   called synchronously *after* the lock is released. A listener may
//!   freely read or write any store, this one included.

pub mod object;
pub mod peer;
pub mod repository;

pub use object::GossipObject;
pub use peer::Peer;
pub use repository::{ListenerId, Repository, RepositoryEvent};

use crate::crypto::hash::ContentHash;
use crate::time::Timestamp;

/// Store of gossip objects.
pub type ObjectStore = Repository<GossipObject>;

/// Store of known peers.
pub type PeerStore = Repository<Peer>;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
    Expired,
    InvalidProofOfWork,
    AddressTooLong,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Anything a [`Repository`] can hold.
pub trait Record: Clone + Send + Sync + 'static {
    /// Content address. Stable across nonce and receive-time changes.
    fn content_hash(&self) -> ContentHash;

    /// Absolute expiry, in seconds since the epoch.
    fn expiration_time(&self) -> Timestamp;

    /// Record-specific admission rule, evaluated at `now`. Deduplication is
    /// handled by the repository and is not repeated here.
    fn check_admission(&self, now: Timestamp) -> Admission;
}
