//! # Gossip Server
//!
//! The public half of the protocol. Every node serves:
//!
//! | Method | Path            | Description                                  |
//! |--------|-----------------|----------------------------------------------|
//! | GET    | `/gossip/:hash` | Full object, or 404                          |
//! | POST   | `/gossip`       | Submit an object (always 200 if well formed) |
//! | POST   | `/peers`        | Submit a peer (always 200 if well formed)    |
//! | WS     | `/gossip`       | Shuffled hash snapshot, then live hashes     |
//! | WS     | `/peers`        | Shuffled peer snapshot, then live peers      |
//!
//! Submissions that fail admission still get a 200. Telling a sender which
//! check failed would hand spammers a free verification oracle.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, trace};

use super::wire::{self, encode_peer};
use crate::store::{GossipObject, ListenerId, ObjectStore, Peer, PeerStore, Record, RepositoryEvent};
use crate::time::now;

// ---------------------------------------------------------------------------
// Announcements
// ---------------------------------------------------------------------------

/// Fan-out of newly admitted records to every WebSocket subscriber and every
/// outbound connection.
#[derive(Clone)]
pub struct Announcements {
    pub objects: broadcast::Sender<GossipObject>,
    pub peers: broadcast::Sender<Peer>,
}

impl Announcements {
    pub fn new(capacity: usize) -> Self {
        let (objects, _) = broadcast::channel(capacity);
        let (peers, _) = broadcast::channel(capacity);
        Self { objects, peers }
    }

    /// Forwards every `Added` event of both stores into the channels.
    pub fn attach(&self, objects: &ObjectStore, peers: &PeerStore) -> (ListenerId, ListenerId) {
        let sender = self.objects.clone();
        let object_listener = objects.subscribe(move |event| {
            if let RepositoryEvent::Added(object) = event {
                // No receivers is not an error.
                let _ = sender.send(object.clone());
            }
        });
        let sender = self.peers.clone();
        let peer_listener = peers.subscribe(move |event| {
            if let RepositoryEvent::Added(peer) = event {
                let _ = sender.send(peer.clone());
            }
        });
        (object_listener, peer_listener)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Shared state of the gossip server.
#[derive(Clone)]
pub struct GossipState {
    pub objects: Arc<ObjectStore>,
    pub peers: Arc<PeerStore>,
    pub announcements: Announcements,
    /// Flips to `true` when the node stops; open streams then hang up.
    pub shutdown: watch::Receiver<bool>,
}

/// Builds the gossip router with permissive CORS and request tracing.
pub fn gossip_router(state: GossipState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/gossip", get(object_stream).post(submit_object))
        .route("/gossip/:hash", get(get_object))
        .route("/peers", get(peer_stream).post(submit_peer))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bad_request(err: wire::WireError) -> Response {
    (StatusCode::BAD_REQUEST, err.to_string()).into_response()
}

/// `GET /gossip/:hash`
async fn get_object(State(state): State<GossipState>, Path(hash): Path<String>) -> Response {
    let hash = match wire::parse_hash(&hash) {
        Ok(hash) => hash,
        Err(err) => return bad_request(err),
    };
    match state.objects.get(&hash) {
        Some(object) => Json(object).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `POST /gossip`
async fn submit_object(State(state): State<GossipState>, body: Bytes) -> Response {
    let received = now();
    let object = match wire::parse_object(&body, received) {
        Ok(object) => object,
        Err(err) => return bad_request(err),
    };
    let verdict = state.objects.admit(object, received);
    trace!(verdict = ?verdict, "object submitted");
    StatusCode::OK.into_response()
}

/// `POST /peers`
async fn submit_peer(State(state): State<GossipState>, body: Bytes) -> Response {
    let peer = match wire::parse_peer(&body) {
        Ok(peer) => peer,
        Err(err) => return bad_request(err),
    };
    let address = peer.address.clone();
    let verdict = state.peers.admit(peer, now());
    trace!(address = %address, verdict = ?verdict, "peer submitted");
    StatusCode::OK.into_response()
}

// ---------------------------------------------------------------------------
// Announcement streams
// ---------------------------------------------------------------------------

/// `WS /gossip`
async fn object_stream(ws: WebSocketUpgrade, State(state): State<GossipState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        // Subscribe before taking the snapshot so nothing falls in between.
        let live = state.announcements.objects.subscribe();
        let snapshot = state.objects.hashes().iter().map(|h| h.to_hex()).collect();
        announce(socket, snapshot, live, state.shutdown, |object| {
            Some(object.content_hash().to_hex())
        })
        .await
    })
}

/// `WS /peers`
async fn peer_stream(ws: WebSocketUpgrade, State(state): State<GossipState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let live = state.announcements.peers.subscribe();
        let snapshot = state
            .peers
            .all()
            .iter()
            .filter_map(|peer| encode_peer(peer).ok())
            .collect();
        announce(socket, snapshot, live, state.shutdown, |peer| encode_peer(peer).ok()).await
    })
}

/// Sends `snapshot` in random order, then every live item, until either side
/// hangs up. Client frames are ignored.
async fn announce<T: Clone + Send + 'static>(
    mut socket: WebSocket,
    mut snapshot: Vec<String>,
    mut live: broadcast::Receiver<T>,
    mut shutdown: watch::Receiver<bool>,
    encode: impl Fn(&T) -> Option<String> + Send,
) {
    snapshot.shuffle(&mut rand::thread_rng());
    for frame in snapshot {
        if socket.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            item = live.recv() => match item {
                Ok(item) => {
                    let Some(frame) = encode(&item) else { continue };
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "announcement subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => break,
        }
    }
}
