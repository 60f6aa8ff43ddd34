//! One outbound connection to a remote peer.
//!
//! ```text
//! Connecting --both sockets open--> Established --socket closed/err--> Closed
//!      \------------handshake failed-------------------------------/
//! ```
//!
//! An established connection runs four tasks:
//!
//! - pull hashes from the remote `/gossip` stream and fetch the unknown ones;
//! - pull peer records from the remote `/peers` stream and admit them;
//! - push local objects (probe with `HEAD`, `POST` on 404), the backlog and
//!   live announcements side by side, each with a bounded number of offers
//!   in flight;
//! - push local peers.
//!
//! Teardown happens once. It aborts the tasks (dropping their channel
//! receivers and any in-flight fetches) and removes the connection from the
//! connected set so the next reconnection sweep may dial again.

use futures::StreamExt;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing::{debug, info, trace, warn};

use super::service::GossipContext;
use super::transport::GossipStream;
use super::wire;
use super::NetworkError;
use crate::config::{NEVER_EXPIRES, OBJECT_PUSH_CONCURRENCY};
use crate::crypto::hash::ContentHash;
use crate::store::{GossipObject, Peer, Record};
use crate::time::now;

/// Lifecycle of a [`PeerConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Established,
    Closed,
}

/// An outbound connection and the tasks it owns.
pub struct PeerConnection {
    address: String,
    state: Mutex<ConnectionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerConnection {
    /// Registers a connection to `address` and starts dialing. Returns `None`
    /// if a connection to that address is already tracked.
    pub(crate) fn open(ctx: &Arc<GossipContext>, address: String) -> Option<Arc<Self>> {
        let connection = Arc::new(Self {
            address: address.clone(),
            state: Mutex::new(ConnectionState::Connecting),
            tasks: Mutex::new(Vec::new()),
        });

        match ctx.connections.entry(address) {
            dashmap::mapref::entry::Entry::Occupied(_) => return None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&connection));
            }
        }

        debug!(address = %connection.address, "dialing peer");
        let driver = tokio::spawn(Arc::clone(&connection).run(Arc::clone(ctx)));
        connection.track(driver);
        Some(connection)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Tears the connection down. Idempotent.
    pub(crate) fn close(&self, ctx: &GossipContext) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        ctx.connections
            .remove_if(&self.address, |_, tracked| std::ptr::eq(Arc::as_ptr(tracked), self));
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        debug!(address = %self.address, "connection closed");
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        if self.state() == ConnectionState::Closed {
            task.abort();
        } else {
            tasks.push(task);
        }
    }

    fn establish(&self) -> bool {
        let mut state = self.state.lock();
        if *state != ConnectionState::Connecting {
            return false;
        }
        *state = ConnectionState::Established;
        true
    }

    async fn run(self: Arc<Self>, ctx: Arc<GossipContext>) {
        let objects = ctx.client.open_stream(&self.address, "/gossip").await;
        let peers = ctx.client.open_stream(&self.address, "/peers").await;
        let (objects, peers) = match (objects, peers) {
            (Ok(objects), Ok(peers)) => (objects, peers),
            (Err(err), _) | (_, Err(err)) => {
                ctx.report(&self.address, "connect", &err);
                self.close(&ctx);
                return;
            }
        };

        if !self.establish() {
            return;
        }
        info!(address = %self.address, "connected to peer");

        // Subscribe before any snapshot is taken so nothing is missed.
        let live_objects = ctx.announcements.objects.subscribe();
        let live_peers = ctx.announcements.peers.subscribe();

        self.track(tokio::spawn(Arc::clone(&self).pull_objects(Arc::clone(&ctx), objects)));
        self.track(tokio::spawn(Arc::clone(&self).pull_peers(Arc::clone(&ctx), peers)));
        self.track(tokio::spawn(
            Arc::clone(&self).push_objects(Arc::clone(&ctx), live_objects),
        ));
        self.track(tokio::spawn(Arc::clone(&self).push_peers(ctx, live_peers)));
    }

    // -- Inbound ------------------------------------------------------------

    async fn pull_objects(self: Arc<Self>, ctx: Arc<GossipContext>, mut stream: GossipStream) {
        let mut fetches = JoinSet::new();
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        let hash = match wire::parse_hash(&text) {
                            Ok(hash) => hash,
                            Err(err) => {
                                trace!(address = %self.address, error = %err, "ignoring frame");
                                continue;
                            }
                        };
                        if !ctx.objects.contains(&hash) {
                            fetches.spawn(fetch(Arc::clone(&ctx), self.address.clone(), hash));
                        }
                    }
                    Some(Ok(Frame::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        ctx.report(&self.address, "read /gossip", &NetworkError::from(err));
                        break;
                    }
                },
                Some(_) = fetches.join_next(), if !fetches.is_empty() => {}
            }
        }
        self.close(&ctx);
    }

    async fn pull_peers(self: Arc<Self>, ctx: Arc<GossipContext>, mut stream: GossipStream) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Frame::Text(text)) => match wire::parse_peer(text.as_bytes()) {
                    Ok(peer) => {
                        let verdict = ctx.peers.admit(peer, now());
                        trace!(address = %self.address, verdict = ?verdict, "peer received");
                    }
                    Err(err) => trace!(address = %self.address, error = %err, "ignoring frame"),
                },
                Ok(Frame::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    ctx.report(&self.address, "read /peers", &NetworkError::from(err));
                    break;
                }
            }
        }
        self.close(&ctx);
    }

    // -- Outbound -----------------------------------------------------------

    async fn push_objects(
        self: Arc<Self>,
        ctx: Arc<GossipContext>,
        mut live: broadcast::Receiver<GossipObject>,
    ) {
        let mut snapshot = ctx.objects.all();
        snapshot.shuffle(&mut rand::thread_rng());
        let mut backlog = snapshot.into_iter();
        let mut backlog_offers = JoinSet::new();
        let mut live_offers = JoinSet::new();

        loop {
            while backlog_offers.len() < OBJECT_PUSH_CONCURRENCY {
                let Some(object) = backlog.next() else { break };
                backlog_offers.spawn(offer_object(Arc::clone(&ctx), self.address.clone(), object));
            }

            tokio::select! {
                received = live.recv(), if live_offers.len() < OBJECT_PUSH_CONCURRENCY => {
                    match received {
                        Ok(object) => {
                            live_offers.spawn(offer_object(
                                Arc::clone(&ctx),
                                self.address.clone(),
                                object,
                            ));
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(address = %self.address, skipped = n, "object push lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(_) = backlog_offers.join_next(), if !backlog_offers.is_empty() => {}
                Some(_) = live_offers.join_next(), if !live_offers.is_empty() => {}
            }
        }
    }

    async fn push_peers(self: Arc<Self>, ctx: Arc<GossipContext>, mut live: broadcast::Receiver<Peer>) {
        for peer in ctx.peers.all() {
            self.offer_peer(&ctx, &peer).await;
        }
        loop {
            match live.recv().await {
                Ok(peer) => self.offer_peer(&ctx, &peer).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(address = %self.address, skipped = n, "peer push lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn offer_peer(&self, ctx: &GossipContext, peer: &Peer) {
        // Seed records never pass remote admission.
        if peer.expiration_time == NEVER_EXPIRES {
            return;
        }
        if let Err(err) = ctx.client.push_peer(&self.address, peer).await {
            ctx.report(&self.address, "push peer", &err);
        }
    }
}

/// Sends `object` unless the remote already has it.
async fn offer_object(ctx: Arc<GossipContext>, address: String, object: GossipObject) {
    let hash = object.content_hash();
    let result = match ctx.client.has_object(&address, &hash).await {
        Ok(true) => Ok(()),
        Ok(false) => ctx.client.push_object(&address, &object).await,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        ctx.report(&address, "push object", &err);
    }
}

/// Fetches one announced object and runs it through admission.
async fn fetch(ctx: Arc<GossipContext>, address: String, hash: ContentHash) {
    match ctx.client.fetch_object(&address, &hash).await {
        Ok(Some(object)) => {
            let verdict = ctx.objects.admit(object, now());
            trace!(address = %address, hash = %hash, verdict = ?verdict, "object fetched");
        }
        Ok(None) => trace!(address = %address, hash = %hash, "announced object is gone"),
        Err(err) => ctx.report(&address, "fetch object", &err),
    }
}
