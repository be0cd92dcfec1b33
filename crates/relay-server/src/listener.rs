//! The example accept loop: the "thin listener" the spec names but does not
//! design (§1). Binds a `TcpListener`, wraps each accepted socket as a
//! listener-origin [`Connection`], answers the `"authenticate"` handshake
//! request against a [`UserProvider`], and then dispatches subsequent
//! inbound requests to a [`RequestHandler`] until the connection closes.

use std::sync::Arc;
use std::time::Duration;

use relay_core::connection::{Connection, ConnectionConfig};
use relay_proto::{Response, Serializer};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::auth::{AuthOutcome, UserProvider};
use crate::client::{ARG_PASSWORD, ARG_USER, AUTHENTICATE_REQUEST};
use crate::directory::UserDirectory;
use crate::error::ServerError;
use crate::handler::RequestHandler;

/// Tunables for the example listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Per-connection tunables (request timeout, etc.) applied to every
    /// accepted socket.
    pub connection: ConnectionConfig,
    /// Maximum time to wait for the first (`"authenticate"`) request after
    /// accepting a socket, before giving up on that connection.
    pub handshake_timeout: Duration,
    /// Maximum number of concurrently accepted connections. New accepts
    /// beyond this bound are closed immediately.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            handshake_timeout: Duration::from_secs(30),
            max_connections: 10_000,
        }
    }
}

/// The example server: owns the listening socket, the user directory, and
/// the capabilities (serializer, user provider, request handler) every
/// accepted connection is wired up with.
pub struct Listener {
    serializer: Arc<dyn Serializer>,
    user_provider: Arc<dyn UserProvider>,
    request_handler: Arc<dyn RequestHandler>,
    directory: Arc<UserDirectory>,
    config: ListenerConfig,
}

impl Listener {
    /// Build a listener around the given capabilities. Does not bind a
    /// socket yet — call [`Listener::serve`].
    #[must_use]
    pub fn new(
        serializer: Arc<dyn Serializer>,
        user_provider: Arc<dyn UserProvider>,
        request_handler: Arc<dyn RequestHandler>,
        config: ListenerConfig,
    ) -> Self {
        Self { serializer, user_provider, request_handler, directory: Arc::new(UserDirectory::new()), config }
    }

    /// The user directory this listener populates as connections
    /// authenticate. Shared with whatever application code needs to look up
    /// a connected user (e.g. to issue a server-initiated request).
    #[must_use]
    pub fn directory(&self) -> Arc<UserDirectory> {
        Arc::clone(&self.directory)
    }

    /// Bind `bind_address` and accept connections until an unrecoverable
    /// accept error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn serve(self: Arc<Self>, bind_address: &str) -> Result<(), ServerError> {
        let tcp_listener =
            TcpListener::bind(bind_address).await.map_err(|err| ServerError::Bind(err.to_string()))?;
        let local_addr = tcp_listener.local_addr().map_err(|err| ServerError::Bind(err.to_string()))?;
        info!(%local_addr, "listening");

        loop {
            let (stream, peer_addr) = match tcp_listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "accept failed");
                    continue;
                },
            };

            if self.directory.len() >= self.config.max_connections {
                warn!(%peer_addr, "rejecting connection: max_connections reached");
                drop(stream);
                continue;
            }

            let listener = Arc::clone(&self);
            tokio::spawn(async move { listener.serve_connection(stream, peer_addr.to_string()).await });
        }
    }

    async fn serve_connection(&self, stream: tokio::net::TcpStream, peer_addr: String) {
        let connection = Connection::from_accepted(
            peer_addr.clone(),
            stream,
            Arc::clone(&self.serializer),
            self.config.connection.clone(),
        );

        let Some(user) = self.handshake(&connection).await else {
            connection.close();
            return;
        };

        info!(%peer_addr, %user, "connection authenticated");
        connection.set_local_identity("server").await;
        connection.mark_connected();
        self.directory.register(user.clone(), Arc::clone(&connection));

        loop {
            let Some(request) = connection.recv_request().await else { break };
            let response = self.request_handler.handle(&user, &connection, request).await;
            if let Err(err) = connection.send_response(response).await {
                debug!(%peer_addr, %user, %err, "failed to send response, ending dispatch loop");
                break;
            }
        }

        self.directory.remove(&user);
        info!(%peer_addr, %user, "connection closed");
    }

    /// Wait for the first inbound request, which by this example protocol's
    /// convention must be named [`AUTHENTICATE_REQUEST`], and answer it
    /// against `self.user_provider`. Returns the authenticated user
    /// identifier on success.
    async fn handshake(&self, connection: &Connection) -> Option<String> {
        let request = match timeout(self.config.handshake_timeout, connection.recv_request()).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("connection closed before sending a handshake request");
                return None;
            },
            Err(_elapsed) => {
                warn!("handshake timed out waiting for the authenticate request");
                return None;
            },
        };

        if request.name != AUTHENTICATE_REQUEST {
            warn!(name = %request.name, "first request was not the authenticate handshake");
            let _ = connection.send_response(Response::error(request.request_id, "expected_authenticate")).await;
            return None;
        }

        let user = request.args.get(ARG_USER).cloned().unwrap_or_default();
        let password = request.args.get(ARG_PASSWORD).cloned();
        let outcome = self.user_provider.check(&user, password.as_deref()).await;

        match outcome {
            AuthOutcome::Accepted => {
                if connection.send_response(Response::ok(request.request_id)).await.is_err() {
                    return None;
                }
                Some(user)
            },
            AuthOutcome::Rejected(code) => {
                let _ = connection.send_response(Response::error(request.request_id, code)).await;
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use relay_core::auth::{Credentials, Handshake as _};
    use relay_core::connection::Connection as DialerConnection;
    use relay_proto::TextSerializer;

    use super::*;
    use crate::auth::AllowAllUsers;
    use crate::client::WireHandshake;
    use crate::handler::EchoHandler;

    #[tokio::test]
    async fn request_round_trip_through_handshake_and_dispatch() {
        let serializer: Arc<dyn Serializer> = Arc::new(TextSerializer);
        let tcp_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = tcp_listener.local_addr().expect("addr");

        let listener = Arc::new(Listener::new(
            Arc::clone(&serializer),
            Arc::new(AllowAllUsers),
            Arc::new(EchoHandler),
            ListenerConfig::default(),
        ));
        let directory = listener.directory();

        let accept_task = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move {
                let (stream, peer_addr) = tcp_listener.accept().await.expect("accept");
                listener.serve_connection(stream, peer_addr.to_string()).await;
            })
        };

        let client = DialerConnection::dial(addr.to_string(), Arc::clone(&serializer), ConnectionConfig::default())
            .await
            .expect("dial");
        let auth_result =
            WireHandshake.authenticate(&client, Credentials::new("userA")).await.expect("handshake");
        assert!(auth_result.successful);
        client.mark_connected();

        // Poll briefly for the listener side to finish registering the user.
        for _ in 0..50 {
            if directory.get("userA").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(directory.get("userA").is_some());

        let mut args = HashMap::new();
        args.insert("greeting".to_string(), "hi".to_string());
        let response = client.request("echo", args).await.expect("request succeeds");
        assert!(response.is_ok());
        let body = String::from_utf8(response.body.expect("body")).expect("utf8");
        assert_eq!(body, "greeting=hi\n");

        client.close();
        accept_task.await.expect("accept task");
    }
}
