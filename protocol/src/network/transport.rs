//! Outbound HTTP and WebSocket calls against a remote gossip server.

use reqwest::StatusCode;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::wire::{self, ObjectSubmission};
use super::NetworkError;
use crate::crypto::hash::ContentHash;
use crate::store::{GossipObject, Peer};
use crate::time::now;

/// A WebSocket opened on a remote peer.
pub type GossipStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client for a remote node's gossip endpoints. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GossipClient {
    http: reqwest::Client,
}

impl GossipClient {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    fn object_url(address: &str, hash: &ContentHash) -> String {
        format!("http://{address}/gossip/{hash}")
    }

    /// `GET /gossip/:hash`. `Ok(None)` on 404.
    pub async fn fetch_object(
        &self,
        address: &str,
        hash: &ContentHash,
    ) -> Result<Option<GossipObject>, NetworkError> {
        let response = self.http.get(Self::object_url(address, hash)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await?;
                Ok(Some(wire::parse_object(&body, now())?))
            }
            status => Err(NetworkError::Status {
                address: address.to_owned(),
                status: status.as_u16(),
            }),
        }
    }

    /// Whether the remote already holds `hash`. Uses `HEAD` so the payload is
    /// not transferred.
    pub async fn has_object(&self, address: &str, hash: &ContentHash) -> Result<bool, NetworkError> {
        let response = self.http.head(Self::object_url(address, hash)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(NetworkError::Status {
                address: address.to_owned(),
                status: status.as_u16(),
            }),
        }
    }

    /// `POST /gossip`.
    pub async fn push_object(&self, address: &str, object: &GossipObject) -> Result<(), NetworkError> {
        self.http
            .post(format!("http://{address}/gossip"))
            .json(&ObjectSubmission::from(object))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// `POST /peers`.
    pub async fn push_peer(&self, address: &str, peer: &Peer) -> Result<(), NetworkError> {
        self.http
            .post(format!("http://{address}/peers"))
            .json(peer)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Opens `ws://{address}{path}`.
    pub async fn open_stream(&self, address: &str, path: &str) -> Result<GossipStream, NetworkError> {
        let (stream, _) = connect_async(format!("ws://{address}{path}")).await?;
        Ok(stream)
    }
}
