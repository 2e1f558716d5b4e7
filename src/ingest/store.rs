//! Message persistence contract

use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use crate::types::{MessageEvent, UserId};

/// Persistence failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable message storage used by the REST layer
pub trait MessageStore: Send + Sync {
    fn persist_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        payload: Value,
    ) -> BoxFuture<'_, Result<MessageEvent, PersistenceError>>;
}

/// In-process message store
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<MessageEvent>>,
    next_id: AtomicU64,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages exchanged between two users, oldest first
    pub fn conversation(&self, a: &UserId, b: &UserId) -> Vec<MessageEvent> {
        self.messages
            .read()
            .iter()
            .filter(|m| {
                (&m.sender_id == a && &m.recipient_id == b)
                    || (&m.sender_id == b && &m.recipient_id == a)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    fn validate(payload: &Value) -> Result<(), PersistenceError> {
        let has_field = |field: &str| {
            payload
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty())
        };

        if has_field("text") || has_field("image") {
            Ok(())
        } else {
            Err(PersistenceError::InvalidMessage(
                "text or image is required".to_string(),
            ))
        }
    }
}

impl MessageStore for InMemoryMessageStore {
    fn persist_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        payload: Value,
    ) -> BoxFuture<'_, Result<MessageEvent, PersistenceError>> {
        Box::pin(async move {
            Self::validate(&payload)?;

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let message =
                MessageEvent::new(sender_id, recipient_id, payload).with_id(format!("msg_{:x}", id));
            self.messages.write().push(message.clone());
            Ok(message)
        })
    }
}
