//! The handshake/authentication capability `Session::connect` consumes.
//!
//! Concrete authenticators and user providers are explicitly out of scope
//! for this crate (§1 of the spec): production deployments supply their
//! own [`Handshake`] implementation, typically itself issuing a
//! [`crate::connection::Connection::request`] carrying credentials and
//! inspecting the response. The two implementations here are test/example
//! doubles, not production authenticators.

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::ConnectionError;

/// Credentials presented during the post-connect handshake.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// User identifier.
    pub user: String,
    /// Password, if the authenticator requires one.
    pub password: Option<String>,
}

impl Credentials {
    /// Build credentials for `user` with no password.
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into(), password: None }
    }

    /// Attach a password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Outcome of a handshake attempt.
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    /// Whether the peer accepted these credentials.
    pub successful: bool,
    /// Error code when `successful` is `false`.
    pub error_code: Option<String>,
    /// The authenticated user identifier, valid when `successful` is `true`.
    pub user: String,
}

impl AuthenticationResult {
    /// Build a successful result for `user`.
    #[must_use]
    pub fn ok(user: impl Into<String>) -> Self {
        Self { successful: true, error_code: None, user: user.into() }
    }

    /// Build a failed result carrying `error_code`.
    #[must_use]
    pub fn failed(error_code: impl Into<String>) -> Self {
        Self { successful: false, error_code: Some(error_code.into()), user: String::new() }
    }
}

/// The capability `Session::connect` invokes after the connection reaches
/// [`crate::state::ConnectionState::Handshaking`], to exchange credentials
/// over that same connection and decide whether the session may proceed.
#[async_trait]
pub trait Handshake: Send + Sync {
    /// Perform the handshake exchange over `connection`, returning the
    /// result. Implementations drive the exchange with
    /// `connection.request`/`connection.send_response`, using whatever
    /// application-level request name and argument shape their server side
    /// expects.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the exchange itself fails at the
    /// transport level (distinct from the peer rejecting the credentials,
    /// which is reported via `AuthenticationResult::successful = false`).
    async fn authenticate(
        &self,
        connection: &Connection,
        credentials: Credentials,
    ) -> Result<AuthenticationResult, ConnectionError>;
}

/// Accepts any credentials unconditionally. Used by tests and the example
/// binary to exercise the connect/reconnect path without a real user
/// provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAcceptHandshake;

#[async_trait]
impl Handshake for AlwaysAcceptHandshake {
    async fn authenticate(
        &self,
        _connection: &Connection,
        credentials: Credentials,
    ) -> Result<AuthenticationResult, ConnectionError> {
        Ok(AuthenticationResult::ok(credentials.user))
    }
}

/// Accepts credentials only if `password` matches a fixed expected value
/// (or both are absent). Used by tests exercising `Authentication` failure.
#[derive(Debug, Clone)]
pub struct PasswordHandshake {
    expected_password: Option<String>,
}

impl PasswordHandshake {
    /// Require `expected_password` to match exactly.
    #[must_use]
    pub fn new(expected_password: impl Into<String>) -> Self {
        Self { expected_password: Some(expected_password.into()) }
    }
}

#[async_trait]
impl Handshake for PasswordHandshake {
    async fn authenticate(
        &self,
        _connection: &Connection,
        credentials: Credentials,
    ) -> Result<AuthenticationResult, ConnectionError> {
        if credentials.password == self.expected_password {
            Ok(AuthenticationResult::ok(credentials.user))
        } else {
            Ok(AuthenticationResult::failed("invalid_credentials"))
        }
    }
}
