//! Message event transported by the relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::UserId;

/// A persisted chat message, built by the storage layer.
///
/// The relay carries it to live connections untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl MessageEvent {
    /// Create an event stamped with the current time
    pub fn new(sender_id: UserId, recipient_id: UserId, payload: Value) -> Self {
        Self {
            id: None,
            sender_id,
            recipient_id,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
