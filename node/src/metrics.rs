//! # Prometheus Metrics
//!
//! Exposes operational metrics for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `agora` namespace so they do not collide with any default global
//! registry consumers. Store-driven metrics are fed by repository listeners
//! (see [`NodeMetrics::observe`]); gauges are refreshed on scrape.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use agora_protocol::identity::IdentityEvent;
use agora_protocol::store::RepositoryEvent;
use agora_protocol::AgoraNode;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Objects currently held.
    pub objects_stored: IntGauge,
    /// Peers currently known.
    pub peers_known: IntGauge,
    /// Outbound connections in the established state.
    pub connected_peers: IntGauge,
    /// Local identities.
    pub identities: IntGauge,
    /// Objects admitted since startup.
    pub objects_admitted_total: IntCounter,
    /// Peer records admitted since startup.
    pub peers_admitted_total: IntCounter,
    /// Objects removed by the expiry sweep.
    pub objects_expired_total: IntCounter,
    /// Messages projected into any inbox.
    pub inbox_messages_total: IntCounter,
    /// Time spent mining objects created through the API.
    pub pow_solve_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("agora".into()), None)?;

        let gauge = |name: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
            let gauge = IntGauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let objects_stored = gauge("objects_stored", "Objects currently held")?;
        let peers_known = gauge("peers_known", "Peer records currently held")?;
        let connected_peers = gauge("connected_peers", "Established outbound connections")?;
        let identities = gauge("identities", "Local identities")?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };
        let objects_admitted_total =
            counter("objects_admitted_total", "Objects admitted since startup")?;
        let peers_admitted_total =
            counter("peers_admitted_total", "Peer records admitted since startup")?;
        let objects_expired_total =
            counter("objects_expired_total", "Objects removed after expiring")?;
        let inbox_messages_total =
            counter("inbox_messages_total", "Messages projected into an inbox")?;

        let pow_solve_seconds = Histogram::with_opts(
            HistogramOpts::new("pow_solve_seconds", "Time to mine a locally created object")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(pow_solve_seconds.clone()))?;

        Ok(Self {
            registry,
            objects_stored,
            peers_known,
            connected_peers,
            identities,
            objects_admitted_total,
            peers_admitted_total,
            objects_expired_total,
            inbox_messages_total,
            pow_solve_seconds,
        })
    }

    /// Wires counters to the node's stores and registry.
    pub fn observe(&self, node: &AgoraNode) {
        let admitted = self.objects_admitted_total.clone();
        let expired = self.objects_expired_total.clone();
        node.objects.subscribe(move |event| match event {
            RepositoryEvent::Added(_) => admitted.inc(),
            RepositoryEvent::Removed(_) => expired.inc(),
        });

        let admitted = self.peers_admitted_total.clone();
        node.peers.subscribe(move |event| {
            if let RepositoryEvent::Added(_) = event {
                admitted.inc();
            }
        });

        let messages = self.inbox_messages_total.clone();
        node.identities.subscribe(move |event| {
            if let IdentityEvent::InboxChanged(_) = event {
                messages.inc();
            }
        });
    }

    /// Refreshes the gauges from the node's current state.
    pub fn refresh(&self, node: &AgoraNode) {
        self.objects_stored.set(node.objects.len() as i64);
        self.peers_known.set(node.peers.len() as i64);
        self.connected_peers.set(node.connected_count() as i64);
        self.identities.set(node.identities.len() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// State of the metrics server.
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: Arc<NodeMetrics>,
    pub node: Arc<AgoraNode>,
}

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    state.metrics.refresh(&state.node);
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
