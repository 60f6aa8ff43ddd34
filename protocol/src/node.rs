//! # Agora Node
//!
//! The single context object that owns a node's state for the lifetime of
//! the process. Nothing in the crate keeps global state; everything hangs
//! off an [`AgoraNode`].
//!
//! ```text
//! AgoraNode
//! ├── ObjectStore ──listeners──> InboxProjector ──> IdentityRegistry
//! ├── PeerStore
//! ├── IdentityRegistry
//! ├── PowWorker
//! └── GossipService (server, connections, timers)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::{NodeConfig, AES_KEY_LENGTH};
use crate::crypto::keys::PublicHalf;
use crate::identity::{IdentityError, IdentityRegistry, InboxProjector};
use crate::message::{seal_for_group, seal_for_public_half, CodecError};
use crate::network::{ConnectionState, GossipService, NetworkError};
use crate::pow::{PowError, PowWorker};
use crate::store::{Admission, GossipObject, ObjectStore, PeerStore, Record};
use crate::time::now;

/// Failures of node-level operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    ProofOfWork(#[from] PowError),

    #[error("freshly mined object was not admitted: {0:?}")]
    NotAdmitted(Admission),
}

/// A running node.
pub struct AgoraNode {
    pub objects: Arc<ObjectStore>,
    pub peers: Arc<PeerStore>,
    pub identities: Arc<IdentityRegistry>,
    projector: Arc<InboxProjector>,
    worker: PowWorker,
    gossip: GossipService,
}

impl AgoraNode {
    /// Starts a node with empty stores.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        Self::start_with(
            config,
            Arc::new(ObjectStore::new()),
            Arc::new(PeerStore::new()),
            Arc::new(IdentityRegistry::new()),
        )
        .await
    }

    /// Starts a node around existing stores, e.g. ones reloaded from a
    /// snapshot. The inbox projection runs over whatever they already hold.
    pub async fn start_with(
        config: NodeConfig,
        objects: Arc<ObjectStore>,
        peers: Arc<PeerStore>,
        identities: Arc<IdentityRegistry>,
    ) -> Result<Self, NodeError> {
        let projector = InboxProjector::attach(Arc::clone(&objects), Arc::clone(&identities));
        let worker = PowWorker::new();
        let gossip = GossipService::start(
            &config,
            Arc::clone(&objects),
            Arc::clone(&peers),
            worker.clone(),
        )
        .await?;

        info!(
            address = %gossip.local_addr(),
            objects = objects.len(),
            peers = peers.len(),
            identities = identities.len(),
            "node started"
        );

        Ok(Self {
            objects,
            peers,
            identities,
            projector,
            worker,
            gossip,
        })
    }

    /// Stops gossip, timers and any running proof-of-work.
    pub fn stop(&self) {
        self.gossip.stop();
        self.projector.detach();
        info!("node stopped");
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.gossip.local_addr()
    }

    /// Replaces the self-advertised addresses; triggers re-advertisement.
    pub fn set_addresses(&self, addresses: Vec<String>) {
        self.gossip.set_addresses(addresses);
    }

    pub fn addresses(&self) -> Vec<String> {
        self.gossip.addresses()
    }

    pub fn connections(&self) -> Vec<(String, ConnectionState)> {
        self.gossip.connections()
    }

    pub fn connected_count(&self) -> usize {
        self.gossip.connected_count()
    }

    /// Mines `payload` for `ttl` seconds and inserts it locally, from where
    /// it propagates.
    pub async fn create_object(&self, payload: Vec<u8>, ttl: u128) -> Result<GossipObject, NodeError> {
        let object = GossipObject::mine(&self.worker, payload, ttl, now()).await?;
        let object = self.publish(object)?;
        info!(hash = %object.content_hash(), ttl = %ttl, "object created");
        Ok(object)
    }

    /// Admits an already-mined object into the local pool. The clock is read
    /// here, not when mining started, so a solve that outlived its lifetime
    /// yields [`Admission::Expired`].
    pub fn publish(&self, object: GossipObject) -> Result<GossipObject, NodeError> {
        match self.objects.admit(object.clone(), now()) {
            Admission::Admitted | Admission::Duplicate => Ok(object),
            verdict => Err(NodeError::NotAdmitted(verdict)),
        }
    }

    /// Signs `text` as `identity_id`, encrypts it under a group key the
    /// identity holds, and publishes it.
    pub async fn post_to_group(
        &self,
        identity_id: Uuid,
        key: &[u8; AES_KEY_LENGTH],
        text: &str,
        ttl: u128,
    ) -> Result<GossipObject, NodeError> {
        let identity = self
            .identities
            .get(identity_id)
            .ok_or(IdentityError::IdentityNotFound(identity_id))?;
        let group = identity.group(key).ok_or(IdentityError::GroupNotFound)?;
        let payload = seal_for_group(&identity.key_pair, &group.name, &group.key, text)?;
        self.create_object(payload, ttl).await
    }

    /// Signs `text` as `identity_id`, seals it to `recipient`, and publishes it.
    pub async fn send_direct(
        &self,
        identity_id: Uuid,
        recipient: &PublicHalf,
        text: &str,
        ttl: u128,
    ) -> Result<GossipObject, NodeError> {
        let identity = self
            .identities
            .get(identity_id)
            .ok_or(IdentityError::IdentityNotFound(identity_id))?;
        let payload = seal_for_public_half(&identity.key_pair, recipient, text)?;
        self.create_object(payload, ttl).await
    }
}
