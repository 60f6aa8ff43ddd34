//! # Inbox Projection
//!
//! Every object in the pool is a candidate message for every identity. For
//! each identity the projector tries, in order:
//!
//! 1. symmetric decryption under each group key it holds;
//! 2. sealed-box decryption under its own keypair.
//!
//! The first attempt that decrypts *and* validates wins. Recipient binding
//! means at most one can. Results are deduplicated by signature hash, so
//! projecting the same object twice (or a re-mined copy of it) is harmless.

use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

use super::registry::{IdentityEvent, IdentityRegistry};
use super::{Identity, UnmoderatedGroup};
use crate::crypto::keys::IdentityKeyPair;
use crate::message::{open_for_group, open_for_identity, Message};
use crate::store::{GossipObject, ListenerId, ObjectStore, RepositoryEvent};

/// Decryption material of one identity.
#[derive(Debug, Clone)]
pub struct Keyring {
    pub identity_id: Uuid,
    pub key_pair: IdentityKeyPair,
    pub groups: Vec<UnmoderatedGroup>,
}

impl Keyring {
    pub fn of(identity: &Identity) -> Self {
        Self {
            identity_id: identity.id,
            key_pair: identity.key_pair.clone(),
            groups: identity.groups.clone(),
        }
    }
}

/// Trial-decrypts one object for one identity.
pub fn project_object(keyring: &Keyring, object: &GossipObject) -> Option<Message> {
    keyring
        .groups
        .iter()
        .find_map(|group| {
            open_for_group(&group.name, &group.key, &object.payload, object.receive_time)
        })
        .or_else(|| open_for_identity(&keyring.key_pair, &object.payload, object.receive_time))
}

/// Keeps every identity's inbox in step with the object pool.
pub struct InboxProjector {
    objects: Arc<ObjectStore>,
    identities: Arc<IdentityRegistry>,
    object_listener: parking_lot::Mutex<Option<ListenerId>>,
    identity_listener: parking_lot::Mutex<Option<ListenerId>>,
}

impl InboxProjector {
    /// Creates a projector, projects the current pool, and subscribes to new
    /// objects and new keys.
    pub fn attach(objects: Arc<ObjectStore>, identities: Arc<IdentityRegistry>) -> Arc<Self> {
        let projector = Arc::new(Self {
            objects: Arc::clone(&objects),
            identities: Arc::clone(&identities),
            object_listener: parking_lot::Mutex::new(None),
            identity_listener: parking_lot::Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&projector);
        let id = objects.subscribe(move |event| {
            if let (RepositoryEvent::Added(object), Some(projector)) = (event, weak.upgrade()) {
                projector.project(object);
            }
        });
        *projector.object_listener.lock() = Some(id);

        let weak: Weak<Self> = Arc::downgrade(&projector);
        let id = identities.subscribe(move |event| {
            let (IdentityEvent::Created(id) | IdentityEvent::KeysAdded(id)) = *event else {
                return;
            };
            if let Some(projector) = weak.upgrade() {
                projector.reproject(id);
            }
        });
        *projector.identity_listener.lock() = Some(id);

        projector.project_all();
        projector
    }

    /// Projects one object into every identity. Returns how many inboxes grew.
    pub fn project(&self, object: &GossipObject) -> usize {
        self.identities
            .keyrings()
            .iter()
            .filter_map(|keyring| {
                project_object(keyring, object).map(|message| (keyring.identity_id, message))
            })
            .filter(|(id, message)| self.identities.deliver(*id, message.clone()))
            .count()
    }

    /// Re-runs the projection of the whole pool for one identity.
    pub fn reproject(&self, id: Uuid) -> usize {
        let Some(keyring) = self.identities.keyring(id) else {
            return 0;
        };
        let delivered = self
            .objects
            .all()
            .iter()
            .filter_map(|object| project_object(&keyring, object))
            .filter(|message| self.identities.deliver(id, message.clone()))
            .count();
        if delivered > 0 {
            debug!(identity = %id, delivered, "inbox re-projected");
        }
        delivered
    }

    fn project_all(&self) -> usize {
        self.objects
            .all()
            .iter()
            .map(|object| self.project(object))
            .sum()
    }

    /// Stops following the object pool and the identity registry.
    pub fn detach(&self) {
        if let Some(id) = self.object_listener.lock().take() {
            self.objects.unsubscribe(id);
        }
        if let Some(id) = self.identity_listener.lock().take() {
            self.identities.unsubscribe(id);
        }
    }
}
