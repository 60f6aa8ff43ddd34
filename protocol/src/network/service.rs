//! # Gossip Service
//!
//! Owns everything that keeps a node in the network: the gossip server, the
//! outbound connections, and three independent timers.
//!
//! | Task         | Cadence                 | Work                                    |
//! |--------------|-------------------------|-----------------------------------------|
//! | expiry       | 1 s                     | sweep expired objects and peers         |
//! | reconnect    | 2 s                     | dial every known, unconnected peer      |
//! | advertise    | 60 s, now, on change    | mine and insert a peer record per address |
//!
//! A peer record that lands in the store is dialed at once; the reconnect
//! sweep only catches what that misses. Transport failures are never retried
//! inline. A failed connection is simply closed and the next reconnection
//! sweep dials it again.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::connection::{ConnectionState, PeerConnection};
use super::server::{gossip_router, Announcements, GossipState};
use super::transport::GossipClient;
use super::NetworkError;
use crate::config::{NodeConfig, ANNOUNCEMENT_CHANNEL_CAPACITY, HTTP_REQUEST_TIMEOUT};
use crate::pow::{PowError, PowWorker};
use crate::store::{ListenerId, ObjectStore, Peer, PeerStore, RepositoryEvent};
use crate::time::now;

/// State shared by the service and every connection it owns.
pub(crate) struct GossipContext {
    pub(crate) objects: Arc<ObjectStore>,
    pub(crate) peers: Arc<PeerStore>,
    pub(crate) client: GossipClient,
    pub(crate) announcements: Announcements,
    pub(crate) connections: DashMap<String, Arc<PeerConnection>>,
    silence_networking_errors: bool,
}

impl GossipContext {
    /// Logs a transport failure, quietly if so configured.
    pub(crate) fn report(&self, address: &str, action: &str, err: &NetworkError) {
        if self.silence_networking_errors {
            trace!(address = %address, action, error = %err, "networking error");
        } else {
            warn!(address = %address, action, error = %err, "networking error");
        }
    }
}

/// Store listeners owned by the service, removed on stop.
struct Listeners {
    announce_objects: ListenerId,
    announce_peers: ListenerId,
    dial: ListenerId,
}

/// The running gossip layer of one node.
pub struct GossipService {
    ctx: Arc<GossipContext>,
    local_addr: SocketAddr,
    addresses: watch::Sender<Vec<String>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    listeners: Mutex<Option<Listeners>>,
    worker: PowWorker,
}

impl GossipService {
    /// Binds the gossip server, seeds bootstrap peers and starts every timer.
    pub async fn start(
        config: &NodeConfig,
        objects: Arc<ObjectStore>,
        peers: Arc<PeerStore>,
        worker: PowWorker,
    ) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(NetworkError::Bind)?;
        let local_addr = listener.local_addr().map_err(NetworkError::Bind)?;
        let client = GossipClient::new(HTTP_REQUEST_TIMEOUT)?;

        let announcements = Announcements::new(ANNOUNCEMENT_CHANNEL_CAPACITY);
        let (announce_objects, announce_peers) = announcements.attach(&objects, &peers);

        let ctx = Arc::new(GossipContext {
            objects: Arc::clone(&objects),
            peers: Arc::clone(&peers),
            client,
            announcements: announcements.clone(),
            connections: DashMap::new(),
            silence_networking_errors: config.silence_networking_errors,
        });

        let (shutdown, _) = watch::channel(false);
        let (addresses, _) = watch::channel(config.advertised_addresses.clone());
        let dial = subscribe_dialer(
            &ctx,
            addresses.subscribe(),
            shutdown.subscribe(),
            local_addr.to_string(),
        );

        let service = Self {
            ctx,
            local_addr,
            addresses,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            listeners: Mutex::new(Some(Listeners {
                announce_objects,
                announce_peers,
                dial,
            })),
            worker,
        };

        for address in &config.bootstrap_peers {
            peers.insert_trusted(Peer::bootstrap(address.clone()));
        }

        let router = gossip_router(GossipState {
            objects,
            peers,
            announcements,
            shutdown: service.shutdown.subscribe(),
        });
        let mut stop = service.shutdown.subscribe();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                })
                .await;
            if let Err(err) = result {
                warn!(error = %err, "gossip server exited");
            }
        });

        let mut tasks = vec![
            server,
            service.spawn_expiry(config.expiry_sweep_interval),
            service.spawn_reconnect(config.reconnect_interval),
        ];
        if config.advertise {
            tasks.push(service.spawn_advertise(config.advertise_interval, config.advertisement_ttl));
        }
        *service.tasks.lock() = tasks;

        info!(address = %local_addr, "gossip service started");
        Ok(service)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replaces the set of self-advertised addresses and re-advertises.
    pub fn set_addresses(&self, addresses: Vec<String>) {
        self.addresses.send_replace(addresses);
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.borrow().clone()
    }

    /// Addresses of every tracked connection with its state.
    pub fn connections(&self) -> Vec<(String, ConnectionState)> {
        self.ctx
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }

    /// Number of connections in [`ConnectionState::Established`].
    pub fn connected_count(&self) -> usize {
        self.ctx
            .connections
            .iter()
            .filter(|entry| entry.value().state() == ConnectionState::Established)
            .count()
    }

    /// Tears everything down: server, timers, connections, proof-of-work.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let connections: Vec<Arc<PeerConnection>> = self
            .ctx
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for connection in connections {
            connection.close(&self.ctx);
        }

        if let Some(listeners) = self.listeners.lock().take() {
            self.ctx.objects.unsubscribe(listeners.announce_objects);
            self.ctx.peers.unsubscribe(listeners.announce_peers);
            self.ctx.peers.unsubscribe(listeners.dial);
        }
        self.worker.cancel();
        info!(address = %self.local_addr, "gossip service stopped");
    }

    // -- Timers -------------------------------------------------------------

    fn spawn_expiry(&self, period: Duration) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let at = now();
                let objects = ctx.objects.sweep_expired(at).len();
                let peers = ctx.peers.sweep_expired(at).len();
                if objects + peers > 0 {
                    debug!(objects, peers, "expired records swept");
                }
            }
        })
    }

    fn spawn_reconnect(&self, period: Duration) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let addresses = self.addresses.subscribe();
        let local = self.local_addr.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let own = addresses.borrow().clone();
                reconnect_sweep(&ctx, &own, &local);
            }
        })
    }

    fn spawn_advertise(&self, period: Duration, ttl: u128) -> JoinHandle<()> {
        let peers = Arc::clone(&self.ctx.peers);
        let worker = self.worker.clone();
        let mut addresses = self.addresses.subscribe();
        tokio::spawn(async move {
            loop {
                let current = addresses.borrow_and_update().clone();
                for address in current {
                    match advertise(&peers, &worker, address, ttl).await {
                        Err(PowError::Cancelled) => return,
                        Err(err) => warn!(error = %err, "self-advertisement failed"),
                        Ok(()) => {}
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    changed = addresses.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        })
    }
}

impl Drop for GossipService {
    fn drop(&mut self) {
        if !*self.shutdown.borrow() {
            self.stop();
        }
    }
}

/// Dials every known peer that is neither connected nor ourselves.
fn reconnect_sweep(ctx: &Arc<GossipContext>, own: &[String], local: &str) {
    for peer in ctx.peers.all() {
        dial(ctx, own, local, &peer.address);
    }
}

/// Opens a connection to `address` unless it is us or already tracked.
fn dial(ctx: &Arc<GossipContext>, own: &[String], local: &str, address: &str) {
    if address == local || own.iter().any(|candidate| candidate == address) {
        return;
    }
    if ctx.connections.contains_key(address) {
        return;
    }
    PeerConnection::open(ctx, address.to_string());
}

/// Dials every peer the moment it is added to the store.
///
/// Mutations made outside a tokio runtime are left to the reconnect sweep.
fn subscribe_dialer(
    ctx: &Arc<GossipContext>,
    addresses: watch::Receiver<Vec<String>>,
    shutdown: watch::Receiver<bool>,
    local: String,
) -> ListenerId {
    let weak: Weak<GossipContext> = Arc::downgrade(ctx);
    ctx.peers.subscribe(move |event| {
        let RepositoryEvent::Added(peer) = event else {
            return;
        };
        if *shutdown.borrow() || tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        if let Some(ctx) = weak.upgrade() {
            let own = addresses.borrow().clone();
            dial(&ctx, &own, &local, &peer.address);
        }
    })
}

/// Mines and inserts a fresh advertisement for `address`.
async fn advertise(
    peers: &PeerStore,
    worker: &PowWorker,
    address: String,
    ttl: u128,
) -> Result<(), PowError> {
    let peer = Peer::mine(worker, address, ttl, now()).await?;
    let address = peer.address.clone();
    let verdict = peers.admit(peer, now());
    debug!(address = %address, verdict = ?verdict, "advertised self");
    Ok(())
}
