//! Message ingest: persistence contract and the bridge into the relay
//!
//! The REST layer persists a message through a [`MessageStore`] and only
//! then hands the stored [`MessageEvent`] to [`MessageIngest::deliver`].
//! The relay never stores messages itself.

pub mod store;

use std::sync::Arc;

use crate::relay::{DeliveryReport, PresenceRelay};
use crate::types::MessageEvent;

pub use store::{InMemoryMessageStore, MessageStore, PersistenceError};

/// Bridge from persisted messages to live connections
#[derive(Clone)]
pub struct MessageIngest {
    relay: Arc<PresenceRelay>,
}

impl MessageIngest {
    pub fn new(relay: Arc<PresenceRelay>) -> Self {
        Self { relay }
    }

    /// Push an already-persisted message to its recipient's connections
    pub fn deliver(&self, message: &MessageEvent) -> DeliveryReport {
        let report = self.relay.deliver_message(message);
        tracing::debug!(
            sender_id = %message.sender_id,
            recipient_id = %message.recipient_id,
            attempted = report.attempted,
            delivered = report.delivered,
            "Message handed to relay"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::ServerEvent;
    use crate::types::VerifiedIdentity;
    use serde_json::json;

    #[tokio::test]
    async fn test_persist_then_deliver() {
        let relay = Arc::new(PresenceRelay::default());
        let ingest = MessageIngest::new(relay.clone());
        let store = InMemoryMessageStore::new();

        let mut alice = relay.connect(&VerifiedIdentity::new("alice", "Alice"));
        while alice.events.try_recv().is_ok() {}

        let message = store
            .persist_message("bob".into(), "alice".into(), json!({"text": "hello"}))
            .await
            .unwrap();
        let report = ingest.deliver(&message);

        assert_eq!(report.delivered, 1);
        let envelope = alice.events.try_recv().unwrap();
        assert_eq!(envelope.event, ServerEvent::Message(message));
    }
}
