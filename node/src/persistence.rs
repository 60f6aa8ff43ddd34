//! # Snapshot Persistence
//!
//! The node's whole state lives in memory. This module mirrors it into a
//! single JSON file, `<data-dir>/agora.json`, and reloads it at startup:
//!
//! ```json
//! { "objects": [...], "peers": [...], "identities": [...] }
//! ```
//!
//! Every store and registry mutation marks the snapshot dirty; a background
//! task rewrites the file (tmp file + rename) whenever it is. A malformed
//! file at startup is logged and ignored. A failed write is fatal: the task
//! returns the error and the node shuts down rather than run on with state
//! it can no longer save.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use agora_protocol::identity::{Identity, IdentityRegistry};
use agora_protocol::store::{GossipObject, ObjectStore, Peer, PeerStore};
use agora_protocol::AgoraNode;

/// File name of the snapshot inside the data directory.
pub const SNAPSHOT_FILE: &str = "agora.json";

/// Everything a node persists.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub objects: Vec<GossipObject>,
    #[serde(default)]
    pub peers: Vec<Peer>,
    #[serde(default)]
    pub identities: Vec<Identity>,
}

/// Stores rebuilt from a snapshot, ready for `AgoraNode::start_with`.
pub struct RestoredState {
    pub objects: Arc<ObjectStore>,
    pub peers: Arc<PeerStore>,
    pub identities: Arc<IdentityRegistry>,
}

impl Snapshot {
    /// Captures the node's current state.
    pub fn capture(node: &AgoraNode) -> Self {
        Self {
            objects: node.objects.all(),
            peers: node.peers.all(),
            identities: node.identities.list(),
        }
    }

    /// Reads a snapshot. A missing file is an empty snapshot; an unreadable
    /// or malformed one is logged and treated the same way.
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot found, starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot unreadable, starting empty");
                return Self::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot malformed, starting empty");
                Self::default()
            }
        }
    }

    /// Writes the snapshot atomically: to `<path>.tmp` first, then renamed
    /// over `path`.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let body = serde_json::to_vec(self).context("failed to serialize snapshot")?;
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Rebuilds stores from the snapshot. Records were admitted once
    /// already, so they are inserted as trusted; anything that expired while
    /// the node was down is dropped by the first expiry sweep.
    pub fn restore(self) -> RestoredState {
        let objects = Arc::new(ObjectStore::new());
        for object in self.objects {
            objects.insert_trusted(object);
        }
        let peers = Arc::new(PeerStore::new());
        for peer in self.peers {
            peers.insert_trusted(peer);
        }
        let identities = Arc::new(IdentityRegistry::new());
        for identity in self.identities {
            identities.restore(identity);
        }
        info!(
            objects = objects.len(),
            peers = peers.len(),
            identities = identities.len(),
            "snapshot restored"
        );
        RestoredState {
            objects,
            peers,
            identities,
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Path of the snapshot for a data directory.
pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE)
}

/// Creates `data_dir` and an empty snapshot in it. An existing snapshot is
/// left untouched. Returns whether a new one was written.
pub async fn init(data_dir: &Path) -> Result<bool> {
    let path = snapshot_path(data_dir);
    if tokio::fs::try_exists(&path)
        .await
        .with_context(|| format!("failed to inspect {}", path.display()))?
    {
        return Ok(false);
    }
    Snapshot::default().write(&path).await?;
    Ok(true)
}

/// Keeps the snapshot file in step with a running node.
pub struct Persistence {
    path: PathBuf,
    dirty: Arc<Notify>,
}

impl Persistence {
    /// Subscribes to every store and the identity registry of `node`.
    pub fn watch(node: &AgoraNode, path: PathBuf) -> Self {
        let dirty = Arc::new(Notify::new());

        let mark = Arc::clone(&dirty);
        node.objects.subscribe(move |_| mark.notify_one());
        let mark = Arc::clone(&dirty);
        node.peers.subscribe(move |_| mark.notify_one());
        let mark = Arc::clone(&dirty);
        node.identities.subscribe(move |_| mark.notify_one());

        // Startup mutations (seed peers, pruned records) predate the listeners.
        dirty.notify_one();
        Self { path, dirty }
    }

    /// Rewrites the snapshot after each batch of changes. Only returns on a
    /// write failure.
    pub async fn run(self, node: Arc<AgoraNode>) -> Result<()> {
        loop {
            self.dirty.notified().await;
            Snapshot::capture(&node)
                .write(&self.path)
                .await
                .context("snapshot persistence failed")?;
            debug!(path = %self.path.display(), "snapshot written");
        }
    }
}
