//! Generic content-addressed repository with admission and expiry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use super::{Admission, Record};
use crate::crypto::hash::ContentHash;
use crate::time::Timestamp;

/// A change to a repository, delivered to listeners.
#[derive(Debug, Clone)]
pub enum RepositoryEvent<T> {
    Added(T),
    Removed(T),
}

/// Handle returned by [`Repository::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Draws the next id from `counter`.
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        ListenerId(counter.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener<T> = Arc<dyn Fn(&RepositoryEvent<T>) + Send + Sync>;

struct Inner<T> {
    /// Primary set, in insertion order.
    items: Vec<T>,
    /// Derived index: content hash -> position in `items`.
    index: HashMap<ContentHash, usize>,
}

impl<T: Record> Inner<T> {
    fn insert(&mut self, item: T) -> bool {
        let hash = item.content_hash();
        if self.index.contains_key(&hash) {
            return false;
        }
        self.index.insert(hash, self.items.len());
        self.items.push(item);
        true
    }

    fn remove(&mut self, hash: &ContentHash) -> Option<T> {
        let position = self.index.remove(hash)?;
        let removed = self.items.swap_remove(position);
        if let Some(moved) = self.items.get(position) {
            self.index.insert(moved.content_hash(), position);
        }
        Some(removed)
    }
}

/// Thread-safe set of records keyed by content hash.
pub struct Repository<T: Record> {
    inner: RwLock<Inner<T>>,
    listeners: RwLock<Vec<(ListenerId, Listener<T>)>>,
    next_listener: AtomicU64,
}

impl<T: Record> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Repository<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                items: Vec::new(),
                index: HashMap::new(),
            }),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    // -- Listeners ----------------------------------------------------------

    /// Registers a change listener. Listeners run synchronously, in
    /// registration order, on the thread that performed the mutation.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&RepositoryEvent<T>) + Send + Sync + 'static,
    {
        let id = ListenerId::next(&self.next_listener);
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(existing, _)| *existing != id);
    }

    fn notify(&self, event: RepositoryEvent<T>) {
        let listeners: Vec<Listener<T>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    // -- Mutation -----------------------------------------------------------

    /// Runs full admission and inserts on success.
    pub fn admit(&self, item: T, now: Timestamp) -> Admission {
        let hash = item.content_hash();
        if self.contains(&hash) {
            return Admission::Duplicate;
        }

        let verdict = item.check_admission(now);
        if !verdict.is_admitted() {
            trace!(hash = %hash, verdict = ?verdict, "record rejected");
            return verdict;
        }

        // The record may have landed while its proof was being checked.
        if !self.inner.write().insert(item.clone()) {
            return Admission::Duplicate;
        }
        self.notify(RepositoryEvent::Added(item));
        Admission::Admitted
    }

    /// Boolean form of [`admit`](Self::admit).
    pub fn insert_if_admissible(&self, item: T, now: Timestamp) -> bool {
        self.admit(item, now).is_admitted()
    }

    /// Inserts without admission checks. Used for trusted seed peers and
    /// snapshot reloads. Still deduplicates.
    pub fn insert_trusted(&self, item: T) -> bool {
        if !self.inner.write().insert(item.clone()) {
            return false;
        }
        self.notify(RepositoryEvent::Added(item));
        true
    }

    /// Removes a record by hash, notifying listeners.
    pub fn remove(&self, hash: &ContentHash) -> Option<T> {
        let removed = self.inner.write().remove(hash)?;
        self.notify(RepositoryEvent::Removed(removed.clone()));
        Some(removed)
    }

    /// Removes every record whose expiration is at or before `now`.
    pub fn sweep_expired(&self, now: Timestamp) -> Vec<T> {
        let expired: Vec<T> = {
            let mut inner = self.inner.write();
            let hashes: Vec<ContentHash> = inner
                .items
                .iter()
                .filter(|item| item.expiration_time() <= now)
                .map(|item| item.content_hash())
                .collect();
            hashes.iter().filter_map(|hash| inner.remove(hash)).collect()
        };
        for item in &expired {
            self.notify(RepositoryEvent::Removed(item.clone()));
        }
        expired
    }

    // -- Queries ------------------------------------------------------------

    pub fn get(&self, hash: &ContentHash) -> Option<T> {
        let inner = self.inner.read();
        inner
            .index
            .get(hash)
            .and_then(|&position| inner.items.get(position).cloned())
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.inner.read().index.contains_key(hash)
    }

    /// Snapshot of every record.
    pub fn all(&self) -> Vec<T> {
        self.inner.read().items.clone()
    }

    /// Snapshot of every content hash.
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.inner.read().index.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::record_hash;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        body: &'static str,
        expires: Timestamp,
        ok: bool,
    }

    impl Record for Item {
        fn content_hash(&self) -> ContentHash {
            record_hash(self.body.as_bytes(), self.expires)
        }
        fn expiration_time(&self) -> Timestamp {
            self.expires
        }
        fn check_admission(&self, _now: Timestamp) -> Admission {
            if self.ok {
                Admission::Admitted
            } else {
                Admission::InvalidProofOfWork
            }
        }
    }

    fn item(body: &'static str, expires: Timestamp) -> Item {
        Item {
            body,
            expires,
            ok: true,
        }
    }

    #[test]
    fn duplicates_are_rejected() {
        let repo = Repository::new();
        assert_eq!(repo.admit(item("a", 10), 0), Admission::Admitted);
        assert_eq!(repo.admit(item("a", 10), 0), Admission::Duplicate);
        assert!(!repo.insert_trusted(item("a", 10)));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn failed_admission_leaves_store_untouched() {
        let repo = Repository::new();
        let bad = Item {
            body: "bad",
            expires: 10,
            ok: false,
        };
        assert!(!repo.insert_if_admissible(bad.clone(), 0));
        assert!(!repo.contains(&bad.content_hash()));
        assert!(repo.is_empty());
    }

    #[test]
    fn index_survives_removal_from_the_middle() {
        let repo = Repository::new();
        for (body, exp) in [("a", 1), ("b", 2), ("c", 3)] {
            repo.insert_trusted(item(body, exp));
        }
        repo.remove(&item("a", 1).content_hash());
        assert_eq!(repo.get(&item("c", 3).content_hash()), Some(item("c", 3)));
        assert_eq!(repo.get(&item("b", 2).content_hash()), Some(item("b", 2)));
        assert_eq!(repo.get(&item("a", 1).content_hash()), None);
        assert_eq!(repo.hashes().len(), 2);
    }

    #[test]
    fn sweep_removes_at_or_before_now() {
        let repo = Repository::new();
        repo.insert_trusted(item("past", 5));
        repo.insert_trusted(item("edge", 10));
        repo.insert_trusted(item("future", 11));

        assert!(repo.sweep_expired(9).len() == 1);
        assert!(repo.contains(&item("edge", 10).content_hash()));
        let swept = repo.sweep_expired(10);
        assert_eq!(swept, vec![item("edge", 10)]);
        assert_eq!(repo.all(), vec![item("future", 11)]);
    }

    #[test]
    fn listeners_see_adds_and_removes_until_unsubscribed() {
        let repo = Repository::new();
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let (a, r) = (Arc::clone(&added), Arc::clone(&removed));
        let id = repo.subscribe(move |event: &RepositoryEvent<Item>| match event {
            RepositoryEvent::Added(_) => {
                a.fetch_add(1, Ordering::SeqCst);
            }
            RepositoryEvent::Removed(_) => {
                r.fetch_add(1, Ordering::SeqCst);
            }
        });

        repo.insert_trusted(item("x", 1));
        repo.insert_trusted(item("x", 1));
        repo.sweep_expired(1);
        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 1);

        repo.unsubscribe(id);
        repo.insert_trusted(item("y", 1));
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_reenter_the_repository() {
        let repo = Arc::new(Repository::new());
        let inner = Arc::clone(&repo);
        repo.subscribe(move |event: &RepositoryEvent<Item>| {
            if let RepositoryEvent::Added(added) = event {
                assert!(inner.contains(&added.content_hash()));
                if added.body == "first" {
                    inner.insert_trusted(item("second", 1));
                }
            }
        });
        repo.insert_trusted(item("first", 1));
        assert_eq!(repo.len(), 2);
    }
}
