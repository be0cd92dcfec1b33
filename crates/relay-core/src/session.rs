//! The client: connect, authenticate, dispatch inbound requests, and
//! reconnect on unexpected transport loss.
//!
//! `Session` owns its `Connection` exclusively — the connection never holds
//! a strong reference back, only the [`CancellationToken`]-style `closed`
//! signal it fans out via [`Connection::subscribe_state`]. A session is
//! assembled once via [`SessionBuilder`] (modules and event handlers are
//! fixed at construction, per the spec's append-only module registry) and
//! then driven through [`Session::connect`]/[`Session::request`] for its
//! whole lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use relay_proto::{Request, Response, Serializer, UNHANDLED_SERVER_ERROR};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::{Credentials, Handshake};
use crate::connection::{Connection, ConnectionConfig};
use crate::error::SessionError;
use crate::registry::{ModuleRegistry, RequestArgs};
use crate::signal::ErrorSignal;
use crate::state::ConnectionState;

/// Default number of reconnect attempts before the loop gives up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;
/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Tunables for a session's connect and reconnect behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-connection tunables, applied to every dial the session performs.
    pub connection: ConnectionConfig,
    /// Number of reconnect attempts after an unexpected close.
    pub reconnect_attempts: u32,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Fired once a session completes connect+authenticate, and again whenever
/// the transport drops unexpectedly.
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    /// The session reached `Connected` (initial connect or a successful
    /// reconnect).
    async fn on_connected(&self, _session: &Session) {}

    /// The underlying connection closed without the session having disposed.
    /// `reason` is a short human-readable description, not a stable code.
    async fn on_closed(&self, _session: &Session, _reason: &str) {}
}

/// Fallback for an inbound request no registered [`crate::registry::Module`]
/// claimed.
#[async_trait]
pub trait RequestReceivedHandler: Send + Sync {
    /// Handle `args.request`, filling in `args.response`. If this leaves
    /// `args.response` unset, the session replies with
    /// [`UNHANDLED_SERVER_ERROR`], same as a handler that panics.
    async fn handle(&self, session: &Session, args: &mut RequestArgs);
}

/// Builds a [`Session`] with a fixed set of modules and event handlers.
///
/// Modules are append-only for the lifetime of the session, so registration
/// only happens here, before the session starts connecting — matching the
/// spec's "append-only during the session's lifetime" module registry.
pub struct SessionBuilder {
    serializer: Arc<dyn Serializer>,
    authenticator: Arc<dyn Handshake>,
    config: SessionConfig,
    modules: ModuleRegistry,
    event_handler: Option<Arc<dyn SessionEventHandler>>,
    request_handler: Option<Arc<dyn RequestReceivedHandler>>,
}

impl SessionBuilder {
    /// Start building a session that serializes bodies with `serializer` and
    /// authenticates via `authenticator`.
    #[must_use]
    pub fn new(serializer: Arc<dyn Serializer>, authenticator: Arc<dyn Handshake>) -> Self {
        Self {
            serializer,
            authenticator,
            config: SessionConfig::default(),
            modules: ModuleRegistry::new(),
            event_handler: None,
            request_handler: None,
        }
    }

    /// Override the default connect/reconnect tunables.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a module, appending it to the dispatch chain.
    #[must_use]
    pub fn with_module<M: crate::registry::Module + 'static>(mut self, module: M) -> Self {
        self.modules.register(module);
        self
    }

    /// Install the connected/closed event handler.
    #[must_use]
    pub fn with_event_handler(mut self, handler: impl SessionEventHandler + 'static) -> Self {
        self.event_handler = Some(Arc::new(handler));
        self
    }

    /// Install an already-shared connected/closed event handler, e.g. one a
    /// test also holds a clone of to assert on afterwards.
    #[must_use]
    pub fn with_event_handler_arc(mut self, handler: Arc<dyn SessionEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Install the `RequestReceived` fallback handler.
    #[must_use]
    pub fn with_request_handler(mut self, handler: impl RequestReceivedHandler + 'static) -> Self {
        self.request_handler = Some(Arc::new(handler));
        self
    }

    /// Finish building. Does not connect — call [`Session::connect`].
    #[must_use]
    pub fn build(self) -> Arc<Session> {
        Arc::new(Session {
            serializer: self.serializer,
            authenticator: self.authenticator,
            config: self.config,
            modules: self.modules,
            event_handler: self.event_handler,
            request_handler: self.request_handler,
            connection: Mutex::new(None),
            remote_address: Mutex::new(None),
            last_credentials: Mutex::new(None),
            user: Mutex::new(None),
            connect_called: AtomicBool::new(false),
            is_connected: AtomicBool::new(false),
            authenticating: AtomicBool::new(false),
            disposed: CancellationToken::new(),
            error_signal: ErrorSignal::new(),
        })
    }
}

/// A client session: one authenticated connection to a remote peer, plus
/// the reconnect/dispatch machinery around it.
pub struct Session {
    serializer: Arc<dyn Serializer>,
    authenticator: Arc<dyn Handshake>,
    config: SessionConfig,
    modules: ModuleRegistry,
    event_handler: Option<Arc<dyn SessionEventHandler>>,
    request_handler: Option<Arc<dyn RequestReceivedHandler>>,
    connection: Mutex<Option<Arc<Connection>>>,
    remote_address: Mutex<Option<String>>,
    last_credentials: Mutex<Option<Credentials>>,
    user: Mutex<Option<String>>,
    connect_called: AtomicBool,
    is_connected: AtomicBool,
    authenticating: AtomicBool,
    disposed: CancellationToken,
    error_signal: ErrorSignal,
}

impl Session {
    /// Connect to `remote_address` and authenticate with `credentials`.
    ///
    /// Callable exactly once per session instance; a second call raises
    /// [`SessionError::InvalidOperation`] without touching any existing
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidOperation`] on a repeat call,
    /// [`SessionError::Authentication`] if the authenticator rejects the
    /// credentials, or a wrapped [`crate::error::ConnectionError`] if the
    /// connect/handshake exchange itself fails.
    pub async fn connect(
        self: &Arc<Self>,
        remote_address: impl Into<String>,
        credentials: Credentials,
    ) -> Result<(), SessionError> {
        if self.connect_called.swap(true, Ordering::SeqCst) {
            return Err(SessionError::InvalidOperation("connect called more than once".to_string()));
        }
        let remote_address = remote_address.into();
        *self.remote_address.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(remote_address.clone());
        *self.last_credentials.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(credentials.clone());

        self.connect_once(&remote_address, credentials).await
    }

    /// Run one full connect+authenticate attempt. Shared by the initial
    /// `connect` call and every reconnect attempt.
    ///
    /// Nothing is rolled back explicitly on failure or on the calling future
    /// being dropped mid-flight: `self.connection` is only assigned after
    /// authentication succeeds, so an aborted attempt simply leaves the
    /// session's visible state untouched.
    async fn connect_once(self: &Arc<Self>, remote_address: &str, credentials: Credentials) -> Result<(), SessionError> {
        self.authenticating.store(true, Ordering::SeqCst);
        let result = self.try_connect_once(remote_address, credentials).await;
        self.authenticating.store(false, Ordering::SeqCst);
        result
    }

    async fn try_connect_once(
        self: &Arc<Self>,
        remote_address: &str,
        credentials: Credentials,
    ) -> Result<(), SessionError> {
        let connection =
            Connection::dial(remote_address, Arc::clone(&self.serializer), self.config.connection.clone()).await?;

        let auth_result = self.authenticator.authenticate(&connection, credentials).await?;
        if !auth_result.successful {
            connection.close();
            return Err(SessionError::Authentication(
                auth_result.error_code.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        connection.set_local_identity(auth_result.user.clone()).await;
        connection.mark_connected();

        *self.user.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(auth_result.user);
        *self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::clone(&connection));
        self.is_connected.store(true, Ordering::SeqCst);

        self.spawn_dispatch_loop(Arc::clone(&connection));
        self.spawn_close_watcher(Arc::clone(&connection));
        self.fire_connected().await;
        Ok(())
    }

    fn spawn_dispatch_loop(self: &Arc<Self>, connection: Arc<Connection>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let Some(request) = connection.recv_request().await else { break };
                let session = Arc::clone(&session);
                let connection = Arc::clone(&connection);
                tokio::spawn(async move { session.dispatch_one(connection, request).await });
            }
        });
    }

    async fn dispatch_one(self: Arc<Self>, connection: Arc<Connection>, request: Request) {
        let request_id = request.request_id;
        let session = Arc::clone(&self);
        let response = match tokio::spawn(async move { session.run_handlers(request).await }).await {
            Ok(Some(response)) => response,
            Ok(None) => Response::error(request_id, UNHANDLED_SERVER_ERROR),
            Err(join_error) => {
                self.error_signal.signal("dispatch", format!("handler panicked: {join_error}"));
                Response::error(request_id, UNHANDLED_SERVER_ERROR)
            },
        };
        if let Err(err) = connection.send_response(response).await {
            self.error_signal.signal("dispatch", format!("failed to send response: {err}"));
        }
    }

    async fn run_handlers(&self, request: Request) -> Option<Response> {
        let mut args = RequestArgs::new(request);
        let handled = self.modules.dispatch(self, &mut args).await;
        if !handled {
            if let Some(handler) = &self.request_handler {
                handler.handle(self, &mut args).await;
            }
        }
        args.response
    }

    fn spawn_close_watcher(self: &Arc<Self>, connection: Arc<Connection>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut states = connection.subscribe_state();
            loop {
                if *states.borrow() == ConnectionState::Closed {
                    break;
                }
                if states.changed().await.is_err() {
                    break;
                }
            }
            session.handle_unexpected_close().await;
        });
    }

    async fn handle_unexpected_close(self: &Arc<Self>) {
        if self.disposed.is_cancelled() {
            return;
        }
        if !self.is_connected.swap(false, Ordering::SeqCst) {
            // Either already handling a previous close, or never connected
            // (e.g. this watcher belongs to a dial attempt superseded before
            // it finished authenticating).
            return;
        }
        self.fire_closed("transport closed").await;
        self.run_reconnect_loop().await;
    }

    async fn run_reconnect_loop(self: &Arc<Self>) {
        let remote_address = {
            self.remote_address.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
        };
        let Some(remote_address) = remote_address else { return };

        for attempt in 1..=self.config.reconnect_attempts {
            if self.disposed.is_cancelled() {
                return;
            }
            let credentials = {
                self.last_credentials.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
            }
            .unwrap_or_default();

            match self.connect_once(&remote_address, credentials).await {
                Ok(()) => return,
                Err(err) if !err.is_transient() => {
                    self.error_signal.signal(
                        "reconnect",
                        format!("attempt {attempt} failed with a non-transient error, giving up: {err}"),
                    );
                    return;
                },
                Err(err) => {
                    self.error_signal.signal("reconnect", format!("attempt {attempt} failed: {err}"));
                },
            }

            tokio::select! {
                () = self.disposed.cancelled() => return,
                () = tokio::time::sleep(self.config.reconnect_delay) => {},
            }
        }
        self.error_signal.signal("reconnect", "exhausted reconnect attempts without success");
    }

    async fn fire_connected(self: &Arc<Self>) {
        let Some(handler) = self.event_handler.clone() else { return };
        let session = Arc::clone(self);
        let joined = tokio::spawn(async move { handler.on_connected(&session).await }).await;
        if let Err(err) = joined {
            self.error_signal.signal("connected_event", format!("handler panicked: {err}"));
        }
    }

    async fn fire_closed(self: &Arc<Self>, reason: &str) {
        let Some(handler) = self.event_handler.clone() else { return };
        let session = Arc::clone(self);
        let reason = reason.to_string();
        let joined = tokio::spawn(async move { handler.on_closed(&session, &reason).await }).await;
        if let Err(err) = joined {
            self.error_signal.signal("closed_event", format!("handler panicked: {err}"));
        }
    }

    /// Send a request over the session's current connection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the session has never
    /// connected, or is between an unexpected close and a successful
    /// reconnect. Otherwise delegates to [`Connection::request`].
    pub async fn request(&self, name: impl Into<String>, args: HashMap<String, String>) -> Result<Response, SessionError> {
        if !self.is_connected.load(Ordering::SeqCst) && !self.authenticating.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }
        let connection = {
            self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
        };
        let Some(connection) = connection else { return Err(SessionError::NotConnected) };
        Ok(connection.request(name, args).await?)
    }

    /// The authenticated user identifier, once connected.
    #[must_use]
    pub fn user(&self) -> Option<String> {
        self.user.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Whether the session currently holds a `Connected` connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    /// The process-wide-or-own error signal background tasks report to.
    #[must_use]
    pub fn error_signal(&self) -> &ErrorSignal {
        &self.error_signal
    }

    /// Tear the session down: cancel any in-flight reconnect loop, close the
    /// current connection, and dispose every registered module in insertion
    /// order.
    pub async fn dispose(self: &Arc<Self>) {
        self.disposed.cancel();
        let connection = {
            self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take()
        };
        if let Some(connection) = connection {
            connection.close();
        }
        self.is_connected.store(false, Ordering::SeqCst);
        self.modules.dispose_all().await;
        debug!("session disposed");
    }
}
