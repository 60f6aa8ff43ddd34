//! # Management API
//!
//! Builds the axum router for the node's local REST interface: identities,
//! groups, contacts, posting and inbox reads. It is bound to 127.0.0.1 and
//! is the only way a UI talks to the node.
//!
//! ## Endpoints
//!
//! | Method | Path                                      | Description              |
//! |--------|-------------------------------------------|--------------------------|
//! | GET    | `/health`                                 | Liveness probe           |
//! | GET    | `/status`                                 | Node status summary      |
//! | GET    | `/identities`                             | List identities          |
//! | POST   | `/identities`                             | Create an identity       |
//! | POST   | `/identities/:id/rename`                  | Rename an identity       |
//! | DELETE | `/identities/:id`                         | Delete an identity       |
//! | GET    | `/identities/:id/groups`                  | List groups with keys    |
//! | POST   | `/identities/:id/groups`                  | Create a group           |
//! | POST   | `/identities/:id/groups/join`             | Join a group by key      |
//! | POST   | `/identities/:id/groups/rename`           | Rename a group           |
//! | POST   | `/identities/:id/groups/leave`            | Leave a group            |
//! | GET    | `/identities/:id/contacts`                | List contacts            |
//! | POST   | `/identities/:id/contacts`                | Add a contact            |
//! | POST   | `/identities/:id/contacts/:contact_id`    | Edit a contact           |
//! | DELETE | `/identities/:id/contacts/:contact_id`    | Delete a contact         |
//! | POST   | `/identities/:id/posts`                   | Post to a group          |
//! | POST   | `/identities/:id/direct`                  | Send a direct message    |
//! | GET    | `/identities/:id/inbox`                   | Read the inbox           |
//!
//! Keys travel as fixed-length hex strings. Malformed input is a 400, an
//! unknown identity, group or contact is a 404; both carry `{"error": ...}`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use agora_protocol::config::AES_KEY_LENGTH;
use agora_protocol::crypto::hash::ContentHash;
use agora_protocol::crypto::keys::PublicHalf;
use agora_protocol::encoding::{decimal, hex_array};
use agora_protocol::identity::{Contact, Identity, IdentityError, UnmoderatedGroup};
use agora_protocol::message::Message;
use agora_protocol::store::{GossipObject, Record};
use agora_protocol::{AgoraNode, NodeError};

use crate::metrics::NodeMetrics;

/// Longest lifetime, in seconds, the API will mine an object for (28 days).
pub const MAX_TIME_TO_LIVE: u128 = 28 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub node: Arc<AgoraNode>,
    pub metrics: Arc<NodeMetrics>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a management request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Identity(e) => e.into(),
            NodeError::NotAdmitted(verdict) => {
                ApiError::BadRequest(format!("object not admitted: {:?}", verdict))
            }
            other => {
                tracing::error!(error = %other, "management request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    pub objects: usize,
    pub peers: usize,
    pub connections: usize,
    pub identities: usize,
    pub addresses: Vec<String>,
    pub timestamp: String,
}

/// An identity without its secrets or inbox.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub id: Uuid,
    pub name: String,
    pub public_half: PublicHalf,
}

impl From<&Identity> for IdentitySummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            name: identity.name.clone(),
            public_half: identity.public_half(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupKeyRequest {
    #[serde(with = "hex_array")]
    pub key: [u8; AES_KEY_LENGTH],
}

#[derive(Debug, Deserialize)]
pub struct NamedGroupRequest {
    pub name: String,
    #[serde(with = "hex_array")]
    pub key: [u8; AES_KEY_LENGTH],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub name: String,
    pub public_half: PublicHalf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEdit {
    pub name: Option<String>,
    pub public_half: Option<PublicHalf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPost {
    #[serde(with = "hex_array")]
    pub key: [u8; AES_KEY_LENGTH],
    pub content: String,
    #[serde(with = "decimal")]
    pub time_to_live: u128,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub public_half: PublicHalf,
    pub content: String,
    #[serde(with = "decimal")]
    pub time_to_live: u128,
}

/// The object a post was published as.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedObject {
    pub hash: ContentHash,
    #[serde(with = "decimal")]
    pub expiration_time: u128,
}

impl From<GossipObject> for PublishedObject {
    fn from(object: GossipObject) -> Self {
        Self {
            hash: object.content_hash(),
            expiration_time: object.expiration_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the management [`Router`] with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/identities", get(list_identities).post(create_identity))
        .route("/identities/:id", delete(delete_identity))
        .route("/identities/:id/rename", post(rename_identity))
        .route("/identities/:id/groups", get(list_groups).post(create_group))
        .route("/identities/:id/groups/join", post(join_group))
        .route("/identities/:id/groups/rename", post(rename_group))
        .route("/identities/:id/groups/leave", post(leave_group))
        .route("/identities/:id/contacts", get(list_contacts).post(add_contact))
        .route(
            "/identities/:id/contacts/:contact_id",
            post(edit_contact).delete(delete_contact),
        )
        .route("/identities/:id/posts", post(post_to_group))
        .route("/identities/:id/direct", post(send_direct))
        .route("/identities/:id/inbox", get(read_inbox))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` - returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` - store sizes and connectivity.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let node = &state.node;
    Json(StatusResponse {
        version: state.version.clone(),
        objects: node.objects.len(),
        peers: node.peers.len(),
        connections: node.connected_count(),
        identities: node.identities.len(),
        addresses: node.addresses(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn lookup(node: &AgoraNode, id: Uuid) -> Result<Identity, ApiError> {
    node.identities
        .get(id)
        .ok_or_else(|| IdentityError::IdentityNotFound(id).into())
}

fn check_time_to_live(ttl: u128) -> Result<(), ApiError> {
    if ttl == 0 || ttl > MAX_TIME_TO_LIVE {
        return Err(ApiError::BadRequest(format!(
            "timeToLive must be between 1 and {} seconds",
            MAX_TIME_TO_LIVE
        )));
    }
    Ok(())
}

fn ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// -- Identities -------------------------------------------------------------

async fn list_identities(State(state): State<AppState>) -> Json<Vec<IdentitySummary>> {
    let identities = state.node.identities.list();
    Json(identities.iter().map(IdentitySummary::from).collect())
}

async fn create_identity(
    State(state): State<AppState>,
    body: Result<Json<NameRequest>, JsonRejection>,
) -> ApiResult<IdentitySummary> {
    let Json(request) = body?;
    let identity = state.node.identities.create_identity(request.name);
    Ok(Json(IdentitySummary::from(&identity)))
}

async fn rename_identity(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<NameRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Path(id) = id?;
    let Json(request) = body?;
    state.node.identities.rename_identity(id, request.name)?;
    Ok(ok())
}

async fn delete_identity(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<serde_json::Value> {
    let Path(id) = id?;
    state.node.identities.delete_identity(id)?;
    Ok(ok())
}

// -- Groups -----------------------------------------------------------------

async fn list_groups(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<UnmoderatedGroup>> {
    let Path(id) = id?;
    Ok(Json(lookup(&state.node, id)?.groups))
}

async fn create_group(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<NameRequest>, JsonRejection>,
) -> ApiResult<UnmoderatedGroup> {
    let Path(id) = id?;
    let Json(request) = body?;
    Ok(Json(state.node.identities.create_group(id, request.name)?))
}

async fn join_group(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<NamedGroupRequest>, JsonRejection>,
) -> ApiResult<UnmoderatedGroup> {
    let Path(id) = id?;
    let Json(request) = body?;
    let group = state
        .node
        .identities
        .join_group(id, request.name, request.key)?;
    Ok(Json(group))
}

async fn rename_group(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<NamedGroupRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Path(id) = id?;
    let Json(request) = body?;
    state
        .node
        .identities
        .rename_group(id, &request.key, request.name)?;
    Ok(ok())
}

async fn leave_group(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<GroupKeyRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Path(id) = id?;
    let Json(request) = body?;
    state.node.identities.leave_group(id, &request.key)?;
    Ok(ok())
}

// -- Contacts ---------------------------------------------------------------

async fn list_contacts(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<Contact>> {
    let Path(id) = id?;
    Ok(Json(lookup(&state.node, id)?.contacts))
}

async fn add_contact(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ContactRequest>, JsonRejection>,
) -> ApiResult<Contact> {
    let Path(id) = id?;
    let Json(request) = body?;
    let contact = state
        .node
        .identities
        .add_contact(id, request.name, request.public_half)?;
    Ok(Json(contact))
}

async fn edit_contact(
    State(state): State<AppState>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
    body: Result<Json<ContactEdit>, JsonRejection>,
) -> ApiResult<Contact> {
    let Path((id, contact_id)) = ids?;
    let Json(edit) = body?;
    let contact = state
        .node
        .identities
        .edit_contact(id, contact_id, edit.name, edit.public_half)?;
    Ok(Json(contact))
}

async fn delete_contact(
    State(state): State<AppState>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> ApiResult<serde_json::Value> {
    let Path((id, contact_id)) = ids?;
    state.node.identities.delete_contact(id, contact_id)?;
    Ok(ok())
}

// -- Messaging --------------------------------------------------------------

/// `POST /identities/:id/posts` - mines and publishes a group post. Answers
/// once the object is in the local store.
async fn post_to_group(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<GroupPost>, JsonRejection>,
) -> ApiResult<PublishedObject> {
    let Path(id) = id?;
    let Json(post) = body?;
    check_time_to_live(post.time_to_live)?;

    let started = Instant::now();
    let object = state
        .node
        .post_to_group(id, &post.key, &post.content, post.time_to_live)
        .await?;
    state
        .metrics
        .pow_solve_seconds
        .observe(started.elapsed().as_secs_f64());
    Ok(Json(object.into()))
}

/// `POST /identities/:id/direct` - mines and publishes a sealed message.
async fn send_direct(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DirectMessage>, JsonRejection>,
) -> ApiResult<PublishedObject> {
    let Path(id) = id?;
    let Json(message) = body?;
    check_time_to_live(message.time_to_live)?;

    let started = Instant::now();
    let object = state
        .node
        .send_direct(id, &message.public_half, &message.content, message.time_to_live)
        .await?;
    state
        .metrics
        .pow_solve_seconds
        .observe(started.elapsed().as_secs_f64());
    Ok(Json(object.into()))
}

async fn read_inbox(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<Message>> {
    let Path(id) = id?;
    Ok(Json(state.node.identities.inbox(id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_protocol::config::NodeConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_app_state() -> AppState {
        let config = NodeConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            advertise: false,
            silence_networking_errors: true,
            ..NodeConfig::default()
        };
        AppState {
            version: "0.1.0-test".into(),
            node: Arc::new(AgoraNode::start(config).await.unwrap()),
            metrics: Arc::new(NodeMetrics::new().unwrap()),
        }
    }

    /// Sends a request and returns (status, parsed JSON body).
    async fn send(
        router: &Router,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(path);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn create(router: &Router, name: &str) -> String {
        let (status, json) = send(
            router,
            "POST",
            "/identities",
            Some(serde_json::json!({ "name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let state = test_app_state().await;
        let router = create_router(state.clone());
        let (status, json) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        state.node.stop();
    }

    #[tokio::test]
    async fn identity_lifecycle() {
        let state = test_app_state().await;
        let router = create_router(state.clone());

        let id = create(&router, "alice").await;
        let (_, list) = send(&router, "GET", "/identities", None).await;
        assert_eq!(list[0]["name"], "alice");
        assert_eq!(list[0]["publicHalf"]["publicSigningKey"].as_str().unwrap().len(), 64);

        let (status, _) = send(
            &router,
            "POST",
            &format!("/identities/{}/rename", id),
            Some(serde_json::json!({ "name": "alice 2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&router, "DELETE", &format!("/identities/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = send(&router, "DELETE", &format!("/identities/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("not found"));

        let (status, _) = send(&router, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        state.node.stop();
    }

    #[tokio::test]
    async fn malformed_input_is_a_bad_request() {
        let state = test_app_state().await;
        let router = create_router(state.clone());
        let id = create(&router, "alice").await;

        let (status, json) = send(
            &router,
            "POST",
            &format!("/identities/{}/groups/join", id),
            Some(serde_json::json!({ "name": "g", "key": "abcd" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, _) = send(&router, "GET", "/identities/not-a-uuid/inbox", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            "POST",
            &format!("/identities/{}/posts", id),
            Some(serde_json::json!({ "key": hex::encode([1u8; 32]), "content": "x", "timeToLive": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        state.node.stop();
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let state = test_app_state().await;
        let router = create_router(state.clone());
        let id = create(&router, "alice").await;

        let (status, _) = send(
            &router,
            "POST",
            &format!("/identities/{}/groups/leave", id),
            Some(serde_json::json!({ "key": hex::encode([7u8; 32]) })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &router,
            "POST",
            &format!("/identities/{}/posts", id),
            Some(serde_json::json!({ "key": hex::encode([7u8; 32]), "content": "x", "timeToLive": 60 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        state.node.stop();
    }

    #[tokio::test]
    async fn contacts_can_be_managed() {
        let state = test_app_state().await;
        let router = create_router(state.clone());
        let alice = create(&router, "alice").await;
        let bob = state.node.identities.create_identity("bob").public_half();

        let (status, contact) = send(
            &router,
            "POST",
            &format!("/identities/{}/contacts", alice),
            Some(serde_json::json!({ "name": "bob", "publicHalf": bob })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let contact_id = contact["id"].as_str().unwrap().to_string();

        let path = format!("/identities/{}/contacts/{}", alice, contact_id);
        let (status, edited) =
            send(&router, "POST", &path, Some(serde_json::json!({ "name": "robert" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["name"], "robert");

        let (status, _) = send(&router, "DELETE", &path, None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, list) = send(&router, "GET", &format!("/identities/{}/contacts", alice), None).await;
        assert_eq!(list, serde_json::json!([]));
        state.node.stop();
    }

    #[tokio::test]
    async fn group_post_reaches_the_inbox() {
        let state = test_app_state().await;
        let router = create_router(state.clone());
        let id = create(&router, "alice").await;

        let (status, group) = send(
            &router,
            "POST",
            &format!("/identities/{}/groups", id),
            Some(serde_json::json!({ "name": "club" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let key = group["key"].as_str().unwrap().to_string();
        assert_eq!(key.len(), 64);

        let (status, published) = send(
            &router,
            "POST",
            &format!("/identities/{}/posts", id),
            Some(serde_json::json!({ "key": key, "content": "hello", "timeToLive": 60 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(published["hash"].as_str().unwrap().len(), 64);

        let (_, inbox) = send(&router, "GET", &format!("/identities/{}/inbox", id), None).await;
        assert_eq!(inbox[0]["message"], "hello");
        assert_eq!(inbox[0]["recipient"]["type"], "unmoderated group");
        assert_eq!(state.metrics.pow_solve_seconds.get_sample_count(), 1);
        state.node.stop();
    }

    #[tokio::test]
    async fn direct_message_reaches_only_the_recipient() {
        let state = test_app_state().await;
        let router = create_router(state.clone());
        let alice = create(&router, "alice").await;
        let bob = state.node.identities.create_identity("bob");

        let (status, _) = send(
            &router,
            "POST",
            &format!("/identities/{}/direct", alice),
            Some(serde_json::json!({
                "publicHalf": bob.public_half(),
                "content": "psst",
                "timeToLive": "60",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, inbox) = send(&router, "GET", &format!("/identities/{}/inbox", bob.id), None).await;
        assert_eq!(inbox[0]["message"], "psst");
        let (_, own) = send(&router, "GET", &format!("/identities/{}/inbox", alice), None).await;
        assert_eq!(own, serde_json::json!([]));
        state.node.stop();
    }
}
