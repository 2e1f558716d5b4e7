//! Message send endpoint: persist first, then push live

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::state::AppState;
use super::{auth_rejection, authenticate, ApiError};
use crate::ingest::PersistenceError;
use crate::types::UserId;

/// Request body for sending a message
#[derive(Debug, Deserialize, Serialize)]
pub struct SendMessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// POST /api/messages/send/:id - store a message and deliver it to the
/// recipient's live connections
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SendMessageBody>,
) -> Response {
    let sender = match authenticate(&state, &headers, None).await {
        Ok(identity) => identity,
        Err(err) => return auth_rejection(err),
    };

    let recipient_id = UserId::new(recipient_id);
    let payload = match serde_json::to_value(&body) {
        Ok(payload) => payload,
        Err(e) => return ApiError::internal(e.to_string()).with_status(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let message = match state
        .store
        .persist_message(sender.user_id.clone(), recipient_id, payload)
        .await
    {
        Ok(message) => message,
        Err(PersistenceError::InvalidMessage(msg)) => {
            return ApiError::bad_request(msg).with_status(StatusCode::BAD_REQUEST)
        }
        Err(err @ PersistenceError::Storage(_)) => {
            tracing::error!(error = %err, "Failed to persist message");
            return ApiError::internal(err.to_string()).with_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    state.ingest.deliver(&message);

    (StatusCode::CREATED, Json(message)).into_response()
}
