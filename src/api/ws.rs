//! WebSocket handshake: origin policy, credential check, upgrade

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;

use super::state::AppState;
use super::{auth_rejection, authenticate, ApiError};
use crate::relay::{run_connection, Lifecycle};

/// Largest accepted inbound frame
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Token fallback for clients that cannot set cookies or headers
    pub token: Option<String>,
}

/// GET /ws - authenticate, then hand the socket to a connection task.
///
/// A rejected handshake never reaches the relay: no registry change and no
/// presence broadcast.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let mut lifecycle = Lifecycle::new();

    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !state.config.origin_allowed(origin) {
            let _ = lifecycle.close();
            tracing::warn!(origin = %origin, "WebSocket origin rejected");
            return ApiError::forbidden("Origin not allowed").with_status(StatusCode::FORBIDDEN);
        }
    }

    let identity = match authenticate(&state, &headers, params.token.as_deref()).await {
        Ok(identity) => identity,
        Err(err) => {
            let _ = lifecycle.close();
            tracing::warn!(error = %err, "WebSocket handshake rejected");
            return auth_rejection(err);
        }
    };

    if let Err(e) = lifecycle.authenticate(identity.user_id.clone()) {
        tracing::error!(error = %e, "Lifecycle out of step");
    }
    tracing::info!(
        user_id = %identity.user_id,
        full_name = %identity.full_name,
        "WebSocket connection authenticated"
    );

    let relay = state.relay.clone();
    let settings = state.config.connection;
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| run_connection(socket, relay, identity, lifecycle, settings))
}
