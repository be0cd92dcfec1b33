//! Error taxonomy for connection lifecycle, request correlation, and session
//! control.
//!
//! One `thiserror` enum per layer, matching how `relay-proto::CodecError`
//! handles the packet layer: [`ConnectionError`] for transport/framing/dial
//! failures, [`CorrelatorError`] for outstanding-request outcomes, and
//! [`SessionError`] for the client-facing surface, which wraps the other two.

use std::io;

use relay_proto::CodecError;
use thiserror::Error;

/// Failures raised by a single connection: dialing, framing, and transport.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `RemoteAddress` did not parse as `host:port`.
    #[error("malformed remote address {0:?}: expected host:port")]
    Format(String),

    /// Every resolved address failed to connect.
    #[error("could not connect to {host}: {reasons:?}")]
    CouldNotConnect {
        /// Host that was being dialed.
        host: String,
        /// One failure reason per address attempted, in attempt order.
        reasons: Vec<String>,
    },

    /// The connection is not in a state that permits the attempted
    /// operation (e.g. send after close, or the read loop hit EOF/an I/O
    /// error).
    #[error("disconnected")]
    Disconnected,

    /// A framed `payload_length` fell outside `(0, 5_000_000]`.
    #[error("invalid frame payload length: {0}")]
    InvalidDataLength(i64),

    /// Ingress `packet_type` has no registry entry.
    #[error("unregistered packet type {0:#04x}")]
    UnregisteredPacketType(u8),

    /// Called an operation requiring a specific lifecycle state (e.g.
    /// `Connect` on a listener-origin connection, or twice on the same
    /// dialer-origin connection).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Envelope/body codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Underlying transport I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// Outstanding-request outcome from the correlator.
    #[error(transparent)]
    Correlator(#[from] CorrelatorError),
}

impl ConnectionError {
    /// Whether this failure is fatal to the connection (closes it) as
    /// opposed to a one-off failed operation the caller may retry.
    #[must_use]
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Disconnected
                | Self::InvalidDataLength(_)
                | Self::UnregisteredPacketType(_)
                | Self::Codec(_)
                | Self::Io(_)
        )
    }
}

/// Outcome of an outstanding request tracked by the [`crate::correlator::Correlator`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorError {
    /// No response arrived within the request's timeout.
    #[error("request timed out")]
    RequestTimeout,

    /// The connection closed before a response arrived.
    #[error("disconnected")]
    Disconnected,
}

/// Errors surfaced to [`crate::session::Session`] callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configured [`crate::auth::Handshake`] reported an unsuccessful
    /// result.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// `Request` called before the session authenticated (and not
    /// currently mid-handshake).
    #[error("not connected")]
    NotConnected,

    /// `Connect` called more than once, or on a session that does not own
    /// a dialer-origin connection.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Failure from the underlying connection.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Failure from the request correlator.
    #[error(transparent)]
    Correlator(#[from] CorrelatorError),
}

impl SessionError {
    /// Whether a fresh `Connect`/`Request` attempt could plausibly succeed
    /// (transient), as opposed to a caller error or explicit rejection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(ConnectionError::CouldNotConnect { .. } | ConnectionError::Disconnected)
                | Self::Correlator(CorrelatorError::Disconnected)
        )
    }
}
