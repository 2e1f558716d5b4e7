//! Presence relay: owns the registry and fans events out to connections
//!
//! Every registry mutation and the fan-out it triggers happen under one
//! registry lock. Pushes never wait (they go into each connection's bounded
//! queue), so holding the lock across a broadcast is cheap, and it gives
//! every connection the same order of presence snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::events::{Envelope, ServerEvent};
use super::handle::{self, ActiveConnection, ConnectionHandle};
use super::registry::{ConnectionRegistry, Connections, Removal};
use crate::types::{MessageEvent, UserId, VerifiedIdentity};

/// Result of pushing one message to its recipient
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Handles the event was pushed to (zero when the recipient is offline)
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn recipient_offline(&self) -> bool {
        self.attempted == 0
    }
}

/// Point-in-time counters for status endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub online_users: usize,
    pub active_connections: usize,
}

/// Presence and message relay
#[derive(Debug)]
pub struct PresenceRelay {
    registry: ConnectionRegistry,
    sequence_counter: AtomicU64,
    next_connection_id: AtomicU64,
    outbound_capacity: usize,
}

impl PresenceRelay {
    /// Default per-connection outbound queue bound
    pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

    /// Smallest queue that fits the welcome event plus the one snapshot a
    /// connect issues
    const MIN_OUTBOUND_CAPACITY: usize = 2;

    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            sequence_counter: AtomicU64::new(0),
            next_connection_id: AtomicU64::new(1),
            outbound_capacity: outbound_capacity.max(Self::MIN_OUTBOUND_CAPACITY),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Get the next sequence ID to be issued
    pub fn current_sequence_id(&self) -> u64 {
        self.sequence_counter.load(Ordering::SeqCst)
    }

    /// Sorted list of online users
    pub fn online_users(&self) -> Vec<UserId> {
        self.registry.lock().identities()
    }

    pub fn stats(&self) -> RelayStats {
        let connections = self.registry.lock();
        RelayStats {
            online_users: connections.user_count(),
            active_connections: connections.connection_count(),
        }
    }

    /// Register an authenticated connection and broadcast the new presence
    /// snapshot to every active connection, this one included.
    pub fn connect(&self, identity: &VerifiedIdentity) -> ActiveConnection {
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let conn = handle::channel(id, identity.user_id.clone(), self.outbound_capacity);

        let mut connections = self.registry.lock();
        // Queue is empty and sized for this, so the welcome cannot fail
        let _ = conn
            .handle
            .push(self.envelope(ServerEvent::Connected(identity.clone())));
        connections.add(&identity.user_id, conn.handle.clone());

        tracing::info!(
            user_id = %identity.user_id,
            connection_id = id,
            connections = connections.connection_count(),
            "Connection registered"
        );

        self.broadcast_presence(&mut connections);
        conn
    }

    /// Unregister a connection. Broadcasts a fresh snapshot when the
    /// registry changed; a handle that is already gone is a no-op.
    pub fn disconnect(&self, handle: &ConnectionHandle) -> Removal {
        let mut connections = self.registry.lock();
        let removal = connections.remove(handle.user_id(), handle.id());

        if removal.mutated() {
            tracing::info!(
                user_id = %handle.user_id(),
                connection_id = handle.id(),
                last_connection = removal == Removal::IdentityRemoved,
                "Connection unregistered"
            );
            self.broadcast_presence(&mut connections);
        }

        removal
    }

    /// Push a persisted message to every live connection of its recipient.
    ///
    /// An offline recipient is not an error; the message is already stored.
    pub fn deliver_message(&self, message: &MessageEvent) -> DeliveryReport {
        let mut connections = self.registry.lock();
        let targets = connections.connections_for(&message.recipient_id);

        if targets.is_empty() {
            tracing::debug!(
                recipient_id = %message.recipient_id,
                "Recipient offline, message not pushed"
            );
            return DeliveryReport::default();
        }

        let envelope = self.envelope(ServerEvent::Message(message.clone()));
        let mut report = DeliveryReport {
            attempted: targets.len(),
            ..DeliveryReport::default()
        };

        let mut failed = Vec::new();
        for handle in targets {
            match handle.push(envelope.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = %handle.user_id(),
                        connection_id = handle.id(),
                        error = %e,
                        "Message push failed"
                    );
                    failed.push(handle);
                }
            }
        }
        report.failed = failed.len();

        if self.evict(&mut connections, failed) {
            self.broadcast_presence(&mut connections);
        }

        report
    }

    /// Best-effort snapshot broadcast.
    ///
    /// A slot is reserved in every queue first; handles that cannot take one
    /// (closed or full) are evicted, then a single snapshot of the survivors
    /// fills the reserved slots.
    fn broadcast_presence(&self, connections: &mut Connections) {
        let mut permits = Vec::new();
        let mut failed = Vec::new();

        for handle in connections.handles() {
            match handle.reserve() {
                Ok(permit) => permits.push(permit),
                Err(e) => {
                    tracing::warn!(
                        user_id = %handle.user_id(),
                        connection_id = handle.id(),
                        error = %e,
                        "Presence push failed"
                    );
                    failed.push(handle.clone());
                }
            }
        }

        self.evict(connections, failed);

        let envelope = self.envelope(ServerEvent::PresenceChanged(connections.identities()));
        for permit in permits {
            permit.send(envelope.clone());
        }
    }

    /// Remove failed handles and signal their tasks. Returns whether the
    /// registry changed.
    fn evict(&self, connections: &mut Connections, failed: Vec<ConnectionHandle>) -> bool {
        let mut mutated = false;
        for handle in failed {
            handle.close();
            mutated |= connections.remove(handle.user_id(), handle.id()).mutated();
        }
        mutated
    }

    fn envelope(&self, event: ServerEvent) -> Arc<Envelope> {
        Arc::new(Envelope {
            event,
            sequence_id: self.sequence_counter.fetch_add(1, Ordering::SeqCst),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }
}

impl Default for PresenceRelay {
    fn default() -> Self {
        Self::new(Self::DEFAULT_OUTBOUND_CAPACITY)
    }
}
