//! Wire events exchanged with WebSocket clients

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MessageEvent, UserId, VerifiedIdentity};

/// Events pushed by the relay to clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First event on every accepted connection
    Connected(VerifiedIdentity),

    /// Sorted list of currently online users
    PresenceChanged(Vec<UserId>),

    /// A persisted message addressed to this connection's user
    Message(MessageEvent),

    /// Reply to a client ping
    Pong,

    /// Non-fatal complaint about a client frame
    Error(ErrorPayload),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ServerEvent {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code: code.to_string(),
            message: message.into(),
        })
    }
}

/// Server event with ordering metadata
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub event: ServerEvent,

    /// Relay-wide sequence number, increasing per connection
    pub sequence_id: u64,

    /// Unix timestamp when the event was issued
    pub timestamp: i64,
}

/// Frames accepted from clients
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Legacy send path; delivery goes through the REST ingest instead
    SendMessage(Value),

    /// Application-level heartbeat
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_changed_serialization() {
        let envelope = Envelope {
            event: ServerEvent::PresenceChanged(vec![UserId::new("alice"), UserId::new("bob")]),
            sequence_id: 7,
            timestamp: 1_700_000_000,
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "presence-changed");
        assert_eq!(json["payload"], json!(["alice", "bob"]));
        assert_eq!(json["sequenceId"], 7);
    }

    #[test]
    fn test_message_event_serialization() {
        let message = MessageEvent::new("bob".into(), "alice".into(), json!({"text": "hey"}));
        let json = serde_json::to_value(ServerEvent::Message(message)).unwrap();

        assert_eq!(json["type"], "message");
        assert_eq!(json["payload"]["senderId"], "bob");
        assert_eq!(json["payload"]["recipientId"], "alice");
    }

    #[test]
    fn test_pong_has_no_payload() {
        let json = serde_json::to_value(ServerEvent::Pong).unwrap();
        assert_eq!(json, json!({"type": "pong"}));
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"send-message","payload":{"text":"hi"}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SendMessage(v) if v["text"] == "hi"));
    }

    #[test]
    fn test_unknown_client_frame_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}
