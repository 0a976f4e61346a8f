//! Route handlers.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use courier_relay::{Payload, PublishOutcome};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::health::health_check;
use crate::response;
use crate::server::AppState;
use crate::ws;

/// Header carrying the recipient identity on publish.
pub const TOKEN_HEADER: &str = "Token";

/// `data` of `/v1/stats`.
#[derive(Debug, Serialize)]
pub struct ServiceStats {
    /// Identities with at least one active session.
    pub subscribers_count: usize,
}

/// `data` of `/v1/stats/sessions`.
#[derive(Debug, Serialize)]
pub struct ActiveSessions {
    /// Active session count per identity.
    pub subscribers_sessions: BTreeMap<String, usize>,
}

/// `GET /v1/subscribe`.
pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    debug!(%peer, "handling new subscription request");
    ws.read_buffer_size(state.config.read_buffer_size)
        .write_buffer_size(state.config.write_buffer_size)
        .on_failed_upgrade(move |error| {
            error!(%peer, %error, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let (sink, stream) = ws::split(socket);
            let handle = state.hub.upgrade(sink, stream, peer.to_string());
            handle.join().await;
            info!(%peer, "websocket connection closed");
        })
}

/// `PUT /v1/publish`.
#[instrument(skip_all, fields(identity))]
pub async fn publish(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    let identity = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_string();
    let _ = tracing::Span::current().record("identity", identity.as_str());

    let payload = match read_payload(body, state.config.max_body_size).await {
        Ok(payload) => payload,
        Err(resp) => return resp,
    };

    match state.hub.publish(&identity, Arc::clone(&payload)).await {
        PublishOutcome::Delivered { .. } => response::ok("message published", &*payload),
        PublishOutcome::Cached { .. } => {
            response::not_found(format!("recipient {identity} not found"), &*payload)
        }
    }
}

/// `POST /v1/broadcast`.
pub async fn broadcast(State(state): State<AppState>, body: Body) -> Response {
    let payload = match read_payload(body, state.config.max_body_size).await {
        Ok(payload) => payload,
        Err(resp) => return resp,
    };
    let recipients = state.hub.broadcast_all(Arc::clone(&payload)).await;
    response::ok(format!("message sent to {recipients} recipients"), &*payload)
}

/// `GET /v1/stats`.
pub async fn stats(State(state): State<AppState>, uri: Uri) -> Response {
    let stats = ServiceStats {
        subscribers_count: state.hub.subscriber_count(),
    };
    response::ok(uri.to_string(), stats)
}

/// `GET /v1/stats/sessions`.
pub async fn stats_sessions(State(state): State<AppState>, uri: Uri) -> Response {
    let sessions = ActiveSessions {
        subscribers_sessions: state.hub.active_session_counts(),
    };
    response::ok(uri.to_string(), sessions)
}

/// `GET /v1/health`.
pub async fn health(State(state): State<AppState>, uri: Uri) -> Response {
    axum::Json(health_check(
        uri.to_string(),
        state.start_time,
        state.hub.open_connections(),
        state.hub.subscriber_count(),
    ))
    .into_response()
}

/// `GET /metrics`.
pub async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(crate::metrics::render)
        .unwrap_or_default()
}

/// Read the whole body, failing once it exceeds `limit` bytes.
async fn read_payload(body: Body, limit: usize) -> Result<Payload, Response> {
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => Ok(Payload::from(String::from_utf8_lossy(&bytes).as_ref())),
        Err(error) => {
            error!(%error, "could not read request body");
            Err(response::internal_error(error.to_string()))
        }
    }
}
