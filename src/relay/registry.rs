//! Connection registry: user identity -> live connection handles
//!
//! Invariant: an identity present in the map always has at least one
//! handle. Identities with no live connection are absent.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::{Mutex, MutexGuard};

use super::handle::{ConnectionHandle, ConnectionId};
use crate::error::RelayError;
use crate::types::UserId;

/// Outcome of removing a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Handle was not registered (already removed by a racing disconnect)
    NotFound,
    /// Handle removed; the identity still has other connections
    HandleRemoved,
    /// Handle removed and it was the identity's last one
    IdentityRemoved,
}

impl Removal {
    /// Whether the registry changed
    pub fn mutated(self) -> bool {
        !matches!(self, Removal::NotFound)
    }
}

/// Unsynchronized registry contents.
///
/// Only reachable through [`ConnectionRegistry::lock`], so every access is
/// already serialized.
#[derive(Debug, Default)]
pub struct Connections {
    by_user: BTreeMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
}

impl Connections {
    /// Insert a handle. Returns false if it was already present.
    pub fn add(&mut self, user_id: &UserId, handle: ConnectionHandle) -> bool {
        self.by_user
            .entry(user_id.clone())
            .or_default()
            .insert(handle.id(), handle)
            .is_none()
    }

    /// Remove a handle, dropping the identity with its last handle
    pub fn remove(&mut self, user_id: &UserId, connection_id: ConnectionId) -> Removal {
        let Some(handles) = self.by_user.get_mut(user_id) else {
            return Removal::NotFound;
        };

        let removed = handles.remove(&connection_id).is_some();
        if handles.is_empty() {
            if !removed {
                self.heal(user_id);
                return Removal::NotFound;
            }
            self.by_user.remove(user_id);
            return Removal::IdentityRemoved;
        }

        if removed {
            Removal::HandleRemoved
        } else {
            Removal::NotFound
        }
    }

    /// Snapshot of one identity's handles, ordered by connection id
    pub fn connections_for(&mut self, user_id: &UserId) -> Vec<ConnectionHandle> {
        let mut snapshot: Vec<ConnectionHandle> = match self.by_user.get(user_id) {
            Some(handles) => handles.values().cloned().collect(),
            None => return Vec::new(),
        };

        if snapshot.is_empty() {
            self.heal(user_id);
            return snapshot;
        }

        snapshot.sort_by_key(ConnectionHandle::id);
        snapshot
    }

    /// Sorted online identities
    pub fn identities(&self) -> Vec<UserId> {
        self.by_user.keys().cloned().collect()
    }

    /// Every registered handle
    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.by_user.values().flat_map(|handles| handles.values())
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn connection_count(&self) -> usize {
        self.by_user.values().map(HashMap::len).sum()
    }

    /// Drop an identity found with an empty handle set
    fn heal(&mut self, user_id: &UserId) {
        let violation = RelayError::RegistryInvariantViolation(user_id.to_string());
        tracing::error!(user_id = %user_id, error = %violation, "Treating identity as offline");
        self.by_user.remove(user_id);
    }
}

/// Thread-safe connection registry
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Connections>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the registry for a compound operation
    pub fn lock(&self) -> MutexGuard<'_, Connections> {
        self.inner.lock()
    }

    /// Insert a handle, creating the identity's entry if absent
    pub fn add_connection(&self, user_id: &UserId, handle: ConnectionHandle) -> bool {
        self.lock().add(user_id, handle)
    }

    /// Remove a handle; a missing handle is not an error
    pub fn remove_connection(&self, user_id: &UserId, connection_id: ConnectionId) -> Removal {
        self.lock().remove(user_id, connection_id)
    }

    /// Snapshot of the identity's current handles (empty if unknown)
    pub fn connections_for(&self, user_id: &UserId) -> Vec<ConnectionHandle> {
        self.lock().connections_for(user_id)
    }

    /// Snapshot of online identities
    pub fn all_identities(&self) -> BTreeSet<UserId> {
        self.lock().identities().into_iter().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connection_count()
    }

    pub fn user_count(&self) -> usize {
        self.lock().user_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::handle::{channel, ActiveConnection};
    use std::sync::Arc;

    fn conn(id: ConnectionId, user: &str) -> ActiveConnection {
        channel(id, UserId::new(user), 8)
    }

    #[test]
    fn test_add_is_idempotent_per_handle() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");
        let c = conn(1, "alice");

        assert!(registry.add_connection(&alice, c.handle.clone()));
        assert!(!registry.add_connection(&alice, c.handle.clone()));
        assert_eq!(registry.connections_for(&alice).len(), 1);
    }

    #[test]
    fn test_second_tab_survives_first_close() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");
        let tab1 = conn(1, "alice");
        let tab2 = conn(2, "alice");

        registry.add_connection(&alice, tab1.handle.clone());
        registry.add_connection(&alice, tab2.handle.clone());

        assert_eq!(registry.remove_connection(&alice, 1), Removal::HandleRemoved);
        assert_eq!(registry.connections_for(&alice), vec![tab2.handle.clone()]);
        assert!(registry.all_identities().contains(&alice));
    }

    #[test]
    fn test_last_close_removes_identity() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");
        let c = conn(1, "alice");

        registry.add_connection(&alice, c.handle.clone());
        assert_eq!(registry.remove_connection(&alice, 1), Removal::IdentityRemoved);
        assert!(registry.all_identities().is_empty());
        assert!(registry.connections_for(&alice).is_empty());
    }

    #[test]
    fn test_double_remove_is_noop() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");
        let c = conn(1, "alice");

        registry.add_connection(&alice, c.handle.clone());
        registry.remove_connection(&alice, 1);
        assert_eq!(registry.remove_connection(&alice, 1), Removal::NotFound);
        assert_eq!(
            registry.remove_connection(&UserId::new("nobody"), 9),
            Removal::NotFound
        );
    }

    #[test]
    fn test_unknown_identity_has_no_connections() {
        let registry = ConnectionRegistry::new();
        assert!(registry.connections_for(&UserId::new("ghost")).is_empty());
    }

    #[test]
    fn test_empty_entry_is_healed() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");
        registry.lock().by_user.insert(alice.clone(), HashMap::new());

        assert!(registry.connections_for(&alice).is_empty());
        assert!(registry.all_identities().is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("alice");
        let c = conn(1, "alice");
        registry.add_connection(&alice, c.handle.clone());

        let snapshot = registry.connections_for(&alice);
        registry.remove_connection(&alice, 1);
        assert_eq!(snapshot.len(), 1);
        assert!(registry.connections_for(&alice).is_empty());
    }

    #[test]
    fn test_concurrent_add_remove_keeps_invariant() {
        let registry = Arc::new(ConnectionRegistry::new());
        let workers: Vec<_> = (0..8u64)
            .map(|worker| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let user = UserId::new(format!("user{}", worker % 3));
                    for i in 0..200u64 {
                        let id = worker * 1000 + i;
                        let c = channel(id, user.clone(), 1);
                        registry.add_connection(&user, c.handle.clone());
                        registry.remove_connection(&user, id);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert!(registry.all_identities().is_empty());
        assert_eq!(registry.connection_count(), 0);
    }
}
