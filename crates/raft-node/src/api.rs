//! # Core HTTP API (C5)
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/op` | Client write path, leader-only |
//! | POST | `/raft` | Peer ingress for consensus messages |
//! | GET | `/status` | Engine status snapshot |
//! | GET | `/metrics` | Node-local counters |
//! | GET | `/healthz` | Liveness |
//!
//! ## Application State
//!
//! Handlers share an [`AppState`]: the consensus handle (for `/raft` and
//! `/status`), the KV store (for `entries` in `/metrics`), the pending
//! table (for `pending_ops`), the peer directory (to resolve the leader
//! hint into an advertise URL), and the propose channel sender.
//!
//! ## Error handling
//!
//! Errors are returned as JSON with appropriate HTTP status codes:
//!
//! ```json
//! {"error": "not leader"}
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use protobuf::Message as ProtoMessage;
use raft::prelude::Message;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::PeerDirectory;
use crate::consensus_loop::{Consensus, Proposal};
use crate::kv_store::KvStore;
use crate::observability::middleware::request_id_middleware;
use crate::pending::{ApplyResult, PendingTable};

const CLIENT_COMMIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const X_RAFT_LEADER: &str = "x-raft-leader";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub local_id: u64,
    pub consensus: Arc<Consensus>,
    pub kv_store: Arc<KvStore>,
    pub pending: Arc<PendingTable>,
    pub peers: Arc<PeerDirectory>,
}

/// API error type (§4.5, §7).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not leader")]
    NotLeader { leader_url: Option<String> },
    #[error("malformed request body: {0}")]
    BadRequest(String),
    #[error("engine rejected the request: {0}")]
    Engine(String),
    #[error("commit timed out")]
    Timeout,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotLeader { .. } => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };

        tracing::warn!(
            error_type = %std::any::type_name::<Self>(),
            error = %self,
            status = %status.as_u16(),
            "API error"
        );

        let mut response = (status, Json(ErrorResponse { error: self.to_string() })).into_response();
        if let ApiError::NotLeader { leader_url: Some(url) } = &self {
            if let Ok(value) = HeaderValue::from_str(url) {
                response.headers_mut().insert(X_RAFT_LEADER, value);
            }
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct StatusResponse {
    id: u64,
    leader_id: u64,
    term: u64,
    commit: u64,
}

#[derive(Serialize)]
struct MetricsResponse {
    id: u64,
    leader_id: u64,
    entries: usize,
    pending_ops: usize,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/op", post(propose_op))
        .route("/raft", post(raft_ingress))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn not_leader_if_needed(state: &AppState) -> Result<(), ApiError> {
    let leader_id = state.consensus.leader_hint().load(Ordering::Acquire);
    if leader_id != 0 && leader_id != state.local_id {
        let leader_url = state.peers.advertise_url(leader_id).map(str::to_string);
        return Err(ApiError::NotLeader { leader_url });
    }
    Ok(())
}

/// `POST /op` — client write path (§4.5).
async fn propose_op(State(state): State<AppState>, body: bytes::Bytes) -> Result<impl IntoResponse, ApiError> {
    not_leader_if_needed(&state)?;

    let id = Uuid::new_v4().to_string();
    let proposal = Proposal {
        id: id.clone(),
        payload: body.to_vec(),
    };
    let data = serde_json::to_vec(&proposal)
        .map_err(|e| ApiError::Engine(format!("failed to encode proposal: {e}")))?;

    let rx = state.pending.register(id.clone());

    let sender = state.consensus.propose_sender();
    if let Err(e) = sender.try_send(data) {
        // Never block the handler on a full channel (§4.5 step 5); hand
        // the blocking send off to a background task instead.
        match e {
            tokio::sync::mpsc::error::TrySendError::Full(data) => {
                tokio::spawn(async move {
                    let _ = sender.send(data).await;
                });
            }
            tokio::sync::mpsc::error::TrySendError::Closed(_) => {
                state.pending.evict(&id);
                return Err(ApiError::Engine("consensus loop is not running".to_string()));
            }
        }
    }

    match tokio::time::timeout(CLIENT_COMMIT_TIMEOUT, rx).await {
        Ok(Ok(ApplyResult::Ok)) => Ok((StatusCode::OK, "ok")),
        Ok(Ok(ApplyResult::Err(e))) => Err(ApiError::Engine(e)),
        Ok(Err(_)) => Err(ApiError::Engine("pending slot dropped without a result".to_string())),
        Err(_) => {
            state.pending.evict(&id);
            Err(ApiError::Timeout)
        }
    }
}

/// `POST /raft` — peer ingress (§4.5).
async fn raft_ingress(State(state): State<AppState>, body: bytes::Bytes) -> Result<StatusCode, ApiError> {
    let msg = Message::parse_from_bytes(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed consensus message: {e}")))?;

    state
        .consensus
        .step(msg)
        .await
        .map_err(|e| ApiError::Engine(e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /status` (§4.5).
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.consensus.status().await;
    Json(StatusResponse {
        id: state.local_id,
        leader_id: status.leader_id,
        term: status.term,
        commit: status.commit,
    })
}

/// `GET /metrics` (§4.5).
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let leader_id = state.consensus.leader_hint().load(Ordering::Acquire);
    Json(MetricsResponse {
        id: state.local_id,
        leader_id,
        entries: state.kv_store.count(),
        pending_ops: state.pending.len(),
    })
}

/// `GET /healthz` (§4.5).
async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::consensus::fake::FakeEngine;
    use crate::consensus_loop::ConsensusContext;
    use crate::observability::logging::LogFormat;
    use crate::transport::PeerTransport;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::AtomicU64;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = NodeConfig::build(
            1,
            "127.0.0.1:9001",
            "1=http://127.0.0.1:9001",
            "error".to_string(),
            LogFormat::Pretty,
        )
        .unwrap();
        let kv_store = Arc::new(KvStore::new());
        let pending = Arc::new(PendingTable::new());
        let peers = Arc::new(config.peers.clone());
        let transport = Arc::new(PeerTransport::new(1, peers.clone()).unwrap());

        let ctx = ConsensusContext {
            kv_store: kv_store.clone(),
            pending: pending.clone(),
            transport,
            leader_hint: Arc::new(AtomicU64::new(0)),
        };
        let (_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let consensus = Arc::new(Consensus::spawn(Box::new(FakeEngine::default()), ctx, shutdown_rx));

        AppState {
            local_id: 1,
            consensus,
            kv_store,
            pending,
            peers,
        }
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let router = create_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_post_op_is_method_not_allowed() {
        let router = create_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/op").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_raft_body_is_bad_request() {
        let router = create_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/raft")
                    .body(Body::from(vec![0xff, 0xff, 0xff]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn op_to_non_leader_is_conflict_with_leader_header() {
        let state = test_state();
        state.consensus.leader_hint().store(2, Ordering::Release);
        let router = create_router(state);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/op")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn status_reports_local_id() {
        let router = create_router(test_state());
        let response = router
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
