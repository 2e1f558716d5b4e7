//! Connection handles held by the registry

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError, OwnedPermit};
use tokio::sync::Notify;

use super::events::Envelope;
use crate::error::TransportError;
use crate::types::UserId;

/// Relay-assigned connection id, unique for the relay's lifetime
pub type ConnectionId = u64;

/// Addressable side of one live client connection.
///
/// Cloning is cheap; every clone pushes into the same bounded outbound
/// queue. Equality and hashing use the connection id only.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    tx: mpsc::Sender<Arc<Envelope>>,
    close_signal: Arc<Notify>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: ConnectionId,
        user_id: UserId,
        tx: mpsc::Sender<Arc<Envelope>>,
        close_signal: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            user_id,
            tx,
            close_signal,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queue an event without waiting.
    ///
    /// A full queue is reported as overflow; the caller closes the
    /// connection rather than letting the queue grow.
    pub fn push(&self, envelope: Arc<Envelope>) -> Result<(), TransportError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::BufferOverflow,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Claim one queue slot without waiting, to be filled later
    pub fn reserve(&self) -> Result<OwnedPermit<Arc<Envelope>>, TransportError> {
        self.tx.clone().try_reserve_owned().map_err(|e| match e {
            TrySendError::Full(_) => TransportError::BufferOverflow,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Ask the owning connection task to shut down
    pub fn close(&self) {
        self.close_signal.notify_one();
    }

    /// True once the connection task has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Receiving side of a registered connection, owned by its task
#[derive(Debug)]
pub struct ActiveConnection {
    pub handle: ConnectionHandle,
    pub events: mpsc::Receiver<Arc<Envelope>>,
    close_signal: Arc<Notify>,
}

impl ActiveConnection {
    pub(crate) fn new(
        handle: ConnectionHandle,
        events: mpsc::Receiver<Arc<Envelope>>,
        close_signal: Arc<Notify>,
    ) -> Self {
        Self {
            handle,
            events,
            close_signal,
        }
    }

    /// Resolves once the relay has evicted this connection
    pub async fn evicted(&self) {
        self.close_signal.notified().await;
    }

    /// Eviction signal detached from `self`, for use alongside `events`
    pub fn eviction_signal(&self) -> Arc<Notify> {
        self.close_signal.clone()
    }
}

/// Build a handle and its receiving side with a bounded queue
pub(crate) fn channel(id: ConnectionId, user_id: UserId, capacity: usize) -> ActiveConnection {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let close_signal = Arc::new(Notify::new());
    let handle = ConnectionHandle::new(id, user_id, tx, close_signal.clone());
    ActiveConnection::new(handle, rx, close_signal)
}
