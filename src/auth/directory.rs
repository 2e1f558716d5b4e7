//! User directory consulted after a token is decoded

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{UserId, VerifiedIdentity};

/// Lookup of users that still exist in the identity store
pub trait UserDirectory: Send + Sync {
    fn find_user(&self, user_id: &UserId) -> Option<VerifiedIdentity>;
}

/// In-process user directory
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, VerifiedIdentity>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from `(id, full name)` pairs
    pub fn with_users<I>(users: I) -> Self
    where
        I: IntoIterator<Item = (UserId, String)>,
    {
        let directory = Self::new();
        for (user_id, full_name) in users {
            directory.insert(VerifiedIdentity::new(user_id, full_name));
        }
        directory
    }

    /// Add or replace a user
    pub fn insert(&self, identity: VerifiedIdentity) {
        self.users.write().insert(identity.user_id.clone(), identity);
    }

    /// Remove a user; later handshakes carrying their token are rejected
    pub fn remove(&self, user_id: &UserId) -> Option<VerifiedIdentity> {
        self.users.write().remove(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_user(&self, user_id: &UserId) -> Option<VerifiedIdentity> {
        self.users.read().get(user_id).cloned()
    }
}
