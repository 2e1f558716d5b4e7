//! Shared application state for HTTP and WebSocket handlers

use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::config::RelayConfig;
use crate::ingest::{MessageIngest, MessageStore};
use crate::relay::PresenceRelay;

/// State handed to every handler
pub struct AppState {
    pub config: RelayConfig,
    /// The relay, created once per server and shared with the ingest bridge
    pub relay: Arc<PresenceRelay>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub store: Arc<dyn MessageStore>,
    pub ingest: MessageIngest,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        verifier: Arc<dyn IdentityVerifier>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let relay = Arc::new(PresenceRelay::new(config.outbound_buffer));
        let ingest = MessageIngest::new(relay.clone());

        Self {
            config,
            relay,
            verifier,
            store,
            ingest,
        }
    }
}
