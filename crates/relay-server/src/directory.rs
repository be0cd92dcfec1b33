//! In-memory mapping from authenticated user identifier to that user's live
//! connection.
//!
//! This is the "user-to-connection directory" the spec names but leaves
//! undesigned (§1): whatever owns a [`Connection`] on the server side needs
//! some way to find it again by user identifier, e.g. to issue a
//! server-initiated request. One session per user is enforced the same way
//! the teacher's own session registry enforces one session per user id —
//! a fresh registration for an already-present user evicts the old entry
//! rather than stacking both.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use relay_core::Connection;

/// Directory of connected users, keyed by the identifier their handshake
/// authenticated as.
#[derive(Default)]
pub struct UserDirectory {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl UserDirectory {
    /// Build an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` under `user`, evicting and returning any
    /// connection previously registered for that user.
    pub fn register(&self, user: impl Into<String>, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut guard = self.connections.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(user.into(), connection)
    }

    /// Remove and return `user`'s connection, if present.
    pub fn remove(&self, user: &str) -> Option<Arc<Connection>> {
        let mut guard = self.connections.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.remove(user)
    }

    /// Look up the live connection for `user`.
    #[must_use]
    pub fn get(&self, user: &str) -> Option<Arc<Connection>> {
        let guard = self.connections.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(user).cloned()
    }

    /// Number of users currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
