//! Server-side half of the handshake: the user provider a connection's
//! first request/response pair is checked against.
//!
//! [`crate::client::WireHandshake`] is the dialer-side counterpart: it sends
//! a `"authenticate"` request carrying `user`/`password` arguments and
//! interprets the response. [`UserProvider`] is what the listener consults
//! to decide how to answer that request. Concrete user stores (a database,
//! an LDAP bind, ...) are out of scope per the spec's §1; the two
//! implementations here are the reference doubles this workspace's tests
//! and example binary use, mirroring `relay_core::auth`'s
//! `AlwaysAcceptHandshake`/`PasswordHandshake` pair on the dialer side.

use std::collections::HashMap;

use async_trait::async_trait;

/// Outcome of checking a user's credentials against the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted; the connection proceeds as this user.
    Accepted,
    /// Credentials rejected with a short error code, returned to the peer
    /// as the handshake response's status.
    Rejected(String),
}

/// Capability the listener's handshake step consults to decide whether to
/// accept a connecting user.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Check `user`/`password` (absent if the peer sent none).
    async fn check(&self, user: &str, password: Option<&str>) -> AuthOutcome;
}

/// Accepts any non-empty user identifier unconditionally. Used by the
/// example binary's default configuration and by tests exercising the
/// happy-path connect/request flow without a real user store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllUsers;

#[async_trait]
impl UserProvider for AllowAllUsers {
    async fn check(&self, user: &str, _password: Option<&str>) -> AuthOutcome {
        if user.is_empty() {
            AuthOutcome::Rejected("empty_user".to_string())
        } else {
            AuthOutcome::Accepted
        }
    }
}

/// Fixed table of `user -> expected password`. A user absent from the table,
/// or present with a mismatched password, is rejected.
#[derive(Debug, Clone, Default)]
pub struct StaticUserTable {
    passwords: HashMap<String, String>,
}

impl StaticUserTable {
    /// Build an empty table; add users with [`StaticUserTable::with_user`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` with `password`.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.passwords.insert(user.into(), password.into());
        self
    }
}

#[async_trait]
impl UserProvider for StaticUserTable {
    async fn check(&self, user: &str, password: Option<&str>) -> AuthOutcome {
        match self.passwords.get(user) {
            Some(expected) if Some(expected.as_str()) == password => AuthOutcome::Accepted,
            Some(_) => AuthOutcome::Rejected("invalid_credentials".to_string()),
            None => AuthOutcome::Rejected("unknown_user".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_rejects_only_empty_user() {
        let provider = AllowAllUsers;
        assert_eq!(provider.check("userA", None).await, AuthOutcome::Accepted);
        assert_eq!(provider.check("", None).await, AuthOutcome::Rejected("empty_user".to_string()));
    }

    #[tokio::test]
    async fn static_table_checks_password() {
        let provider = StaticUserTable::new().with_user("userA", "secret");
        assert_eq!(provider.check("userA", Some("secret")).await, AuthOutcome::Accepted);
        assert_eq!(
            provider.check("userA", Some("wrong")).await,
            AuthOutcome::Rejected("invalid_credentials".to_string())
        );
        assert_eq!(
            provider.check("userB", None).await,
            AuthOutcome::Rejected("unknown_user".to_string())
        );
    }
}
