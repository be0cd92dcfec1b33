//! Connection lifecycle, request correlation, and session control for the
//! relay messaging protocol.
//!
//! This crate builds on `relay_proto`'s wire codec to provide the runtime
//! pieces a client (and, via the lower-level [`connection::Connection`]
//! constructors, a server) needs: a framed, single-writer transport per
//! connection ([`frame_io`]), a monotonic lifecycle state machine
//! ([`state`]), request/response correlation by `request_id`
//! ([`correlator`]), the connection itself ([`connection`]), a pluggable
//! post-connect handshake capability ([`auth`]), an ordered inbound-request
//! handler chain ([`registry`]), the client-facing [`session::Session`], and
//! a sink for errors background tasks cannot propagate ([`signal`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod frame_io;
pub mod registry;
pub mod session;
pub mod signal;
pub mod state;

pub use auth::{AlwaysAcceptHandshake, AuthenticationResult, Credentials, Handshake, PasswordHandshake};
pub use connection::{Connection, ConnectionConfig};
pub use correlator::{Correlator, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ConnectionError, CorrelatorError, SessionError};
pub use frame_io::{FRAME_PREFIX_SIZE, FrameReader, FrameWriter};
pub use registry::{Module, ModuleRegistry, RequestArgs};
pub use session::{RequestReceivedHandler, Session, SessionBuilder, SessionConfig, SessionEventHandler};
pub use signal::{ErrorSignal, ErrorSubscriber, SignaledError};
pub use state::{ConnectionState, StateMachine};
