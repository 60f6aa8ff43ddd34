//! The node's identity set.
//!
//! All mutation goes through the registry so that its listeners (inbox
//! re-projection, snapshot persistence) see every change. Listeners are
//! invoked after the lock is released.

use parking_lot::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Contact, Identity, IdentityError, UnmoderatedGroup};
use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::generate_key;
use crate::crypto::keys::PublicHalf;
use crate::identity::inbox::Keyring;
use crate::message::Message;
use crate::store::ListenerId;

/// What changed, and for which identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityEvent {
    /// Created or restored from a snapshot.
    Created(Uuid),
    /// Gained a group key.
    KeysAdded(Uuid),
    /// Renamed, or its groups or contacts were edited.
    Updated(Uuid),
    /// A message was added to its inbox.
    InboxChanged(Uuid),
    Deleted(Uuid),
}

type Listener = Arc<dyn Fn(&IdentityEvent) + Send + Sync>;

/// Thread-safe, observable set of local identities.
#[derive(Default)]
pub struct IdentityRegistry {
    identities: RwLock<Vec<Identity>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&IdentityEvent) + Send + Sync + 'static,
    {
        let id = ListenerId::next(&self.next_listener);
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(existing, _)| *existing != id);
    }

    fn notify(&self, event: IdentityEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Applies `f` to identity `id` under the write lock, then emits `event`.
    fn update<R>(
        &self,
        id: Uuid,
        event: IdentityEvent,
        f: impl FnOnce(&mut Identity) -> Result<R, IdentityError>,
    ) -> Result<R, IdentityError> {
        let result = {
            let mut identities = self.identities.write();
            let identity = identities
                .iter_mut()
                .find(|identity| identity.id == id)
                .ok_or(IdentityError::IdentityNotFound(id))?;
            f(identity)?
        };
        self.notify(event);
        Ok(result)
    }

    // -- Identities ---------------------------------------------------------

    pub fn create_identity(&self, name: impl Into<String>) -> Identity {
        let identity = Identity::new(name);
        self.identities.write().push(identity.clone());
        info!(id = %identity.id, name = %identity.name, "identity created");
        self.notify(IdentityEvent::Created(identity.id));
        identity
    }

    /// Restores an identity from a snapshot. Ignored if the id already exists.
    pub fn restore(&self, identity: Identity) -> bool {
        let id = identity.id;
        {
            let mut identities = self.identities.write();
            if identities.iter().any(|existing| existing.id == id) {
                return false;
            }
            identities.push(identity);
        }
        self.notify(IdentityEvent::Created(id));
        true
    }

    pub fn rename_identity(&self, id: Uuid, name: impl Into<String>) -> Result<(), IdentityError> {
        let name = name.into();
        self.update(id, IdentityEvent::Updated(id), |identity| {
            identity.name = name;
            Ok(())
        })
    }

    /// Deletes an identity along with its groups, contacts and inbox.
    pub fn delete_identity(&self, id: Uuid) -> Result<Identity, IdentityError> {
        let removed = {
            let mut identities = self.identities.write();
            let position = identities
                .iter()
                .position(|identity| identity.id == id)
                .ok_or(IdentityError::IdentityNotFound(id))?;
            identities.remove(position)
        };
        info!(id = %id, "identity deleted");
        self.notify(IdentityEvent::Deleted(id));
        Ok(removed)
    }

    pub fn get(&self, id: Uuid) -> Option<Identity> {
        self.identities
            .read()
            .iter()
            .find(|identity| identity.id == id)
            .cloned()
    }

    pub fn list(&self) -> Vec<Identity> {
        self.identities.read().clone()
    }

    pub fn len(&self) -> usize {
        self.identities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Groups -------------------------------------------------------------

    /// Creates a group with a fresh random key.
    pub fn create_group(
        &self,
        id: Uuid,
        name: impl Into<String>,
    ) -> Result<UnmoderatedGroup, IdentityError> {
        self.join_group(id, name, generate_key())
    }

    /// Joins a group by key. Joining a group already held is a no-op that
    /// returns the existing entry.
    pub fn join_group(
        &self,
        id: Uuid,
        name: impl Into<String>,
        key: [u8; AES_KEY_LENGTH],
    ) -> Result<UnmoderatedGroup, IdentityError> {
        let name = name.into();
        self.update(id, IdentityEvent::KeysAdded(id), |identity| {
            if let Some(existing) = identity.group(&key) {
                return Ok(existing.clone());
            }
            let group = UnmoderatedGroup { name, key };
            identity.groups.push(group.clone());
            debug!(identity = %identity.id, group = %group.name, "group joined");
            Ok(group)
        })
    }

    pub fn rename_group(
        &self,
        id: Uuid,
        key: &[u8; AES_KEY_LENGTH],
        name: impl Into<String>,
    ) -> Result<(), IdentityError> {
        let name = name.into();
        self.update(id, IdentityEvent::Updated(id), |identity| {
            let group = identity
                .groups
                .iter_mut()
                .find(|group| &group.key == key)
                .ok_or(IdentityError::GroupNotFound)?;
            group.name = name;
            Ok(())
        })
    }

    pub fn leave_group(&self, id: Uuid, key: &[u8; AES_KEY_LENGTH]) -> Result<(), IdentityError> {
        self.update(id, IdentityEvent::Updated(id), |identity| {
            let before = identity.groups.len();
            identity.groups.retain(|group| &group.key != key);
            if identity.groups.len() == before {
                return Err(IdentityError::GroupNotFound);
            }
            Ok(())
        })
    }

    // -- Contacts -----------------------------------------------------------

    pub fn add_contact(
        &self,
        id: Uuid,
        name: impl Into<String>,
        public_half: PublicHalf,
    ) -> Result<Contact, IdentityError> {
        let contact = Contact {
            id: Uuid::new_v4(),
            name: name.into(),
            public_half,
        };
        self.update(id, IdentityEvent::Updated(id), |identity| {
            identity.contacts.push(contact.clone());
            Ok(contact)
        })
    }

    /// Updates whichever contact fields are given.
    pub fn edit_contact(
        &self,
        id: Uuid,
        contact_id: Uuid,
        name: Option<String>,
        public_half: Option<PublicHalf>,
    ) -> Result<Contact, IdentityError> {
        self.update(id, IdentityEvent::Updated(id), |identity| {
            let contact = identity
                .contacts
                .iter_mut()
                .find(|contact| contact.id == contact_id)
                .ok_or(IdentityError::ContactNotFound(contact_id))?;
            if let Some(name) = name {
                contact.name = name;
            }
            if let Some(public_half) = public_half {
                contact.public_half = public_half;
            }
            Ok(contact.clone())
        })
    }

    pub fn delete_contact(&self, id: Uuid, contact_id: Uuid) -> Result<(), IdentityError> {
        self.update(id, IdentityEvent::Updated(id), |identity| {
            let before = identity.contacts.len();
            identity.contacts.retain(|contact| contact.id != contact_id);
            if identity.contacts.len() == before {
                return Err(IdentityError::ContactNotFound(contact_id));
            }
            Ok(())
        })
    }

    // -- Inbox --------------------------------------------------------------

    pub fn inbox(&self, id: Uuid) -> Result<Vec<Message>, IdentityError> {
        self.get(id)
            .map(|identity| identity.inbox.messages().to_vec())
            .ok_or(IdentityError::IdentityNotFound(id))
    }

    /// Adds a projected message to an inbox. Returns whether it was new.
    /// Deleted identities are silently skipped.
    pub fn deliver(&self, id: Uuid, message: Message) -> bool {
        let added = {
            let mut identities = self.identities.write();
            match identities.iter_mut().find(|identity| identity.id == id) {
                Some(identity) => identity.inbox.insert(message),
                None => false,
            }
        };
        if added {
            self.notify(IdentityEvent::InboxChanged(id));
        }
        added
    }

    /// Decryption material for every identity.
    pub fn keyrings(&self) -> Vec<Keyring> {
        self.identities.read().iter().map(Keyring::of).collect()
    }

    pub fn keyring(&self, id: Uuid) -> Option<Keyring> {
        self.identities
            .read()
            .iter()
            .find(|identity| identity.id == id)
            .map(Keyring::of)
    }
}
