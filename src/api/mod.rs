//! HTTP and WebSocket surface of the relay
//!
//! - `GET /ws` - WebSocket handshake (cookie `jwt`, bearer header or `?token=`)
//! - `POST /api/messages/send/:id` - persist a message and push it live
//! - `GET /health` - liveness probe
//! - `GET /socket-status` - online users and connection counts

pub mod http;
pub mod messages;
pub mod state;
pub mod ws;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::{extract_credential, AuthError};
use crate::types::VerifiedIdentity;
use state::AppState;

pub use http::{create_router, serve};

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "UNAUTHORIZED".to_string(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "FORBIDDEN".to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "INTERNAL_ERROR".to_string(),
        }
    }

    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_unauthorized() {
            ApiError::unauthorized(err.to_string())
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

/// Render an auth failure with the matching status
pub(crate) fn auth_rejection(err: AuthError) -> Response {
    let status = if err.is_unauthorized() {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    ApiError::from(err).with_status(status)
}

/// Resolve the caller's identity from handshake or request metadata
pub(crate) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<VerifiedIdentity, AuthError> {
    let credential = extract_credential(headers, query_token).ok_or(AuthError::MissingToken)?;
    state.verifier.resolve_identity(&credential).await
}
