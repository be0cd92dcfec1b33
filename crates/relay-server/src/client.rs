//! The dialer-side counterpart to this workspace's example handshake
//! protocol: an `"authenticate"` request/response pair carried over the
//! connection's ordinary request path, the same one any other business
//! request uses.
//!
//! `relay_core::auth::{AlwaysAcceptHandshake, PasswordHandshake}` decide
//! locally without touching the wire at all — legitimate for a capability
//! that trusts the caller outright, but not a demonstration of the "first
//! request/response pair over the read loop" handshake the spec describes
//! (§4.3). [`WireHandshake`] is that demonstration: it is what
//! `relay-server`'s own accept loop (see [`crate::listener`]) expects to
//! answer.

use async_trait::async_trait;
use relay_core::auth::{AuthenticationResult, Credentials, Handshake};
use relay_core::connection::Connection;
use relay_core::error::ConnectionError;

/// Request name the handshake is carried as.
pub const AUTHENTICATE_REQUEST: &str = "authenticate";
/// Argument key carrying the username.
pub const ARG_USER: &str = "user";
/// Argument key carrying the password, when present.
pub const ARG_PASSWORD: &str = "password";

/// Sends `credentials` as an `"authenticate"` request over `connection` and
/// interprets the response's status as accept/reject.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireHandshake;

#[async_trait]
impl Handshake for WireHandshake {
    async fn authenticate(
        &self,
        connection: &Connection,
        credentials: Credentials,
    ) -> Result<AuthenticationResult, ConnectionError> {
        let mut args = std::collections::HashMap::new();
        args.insert(ARG_USER.to_string(), credentials.user.clone());
        if let Some(password) = &credentials.password {
            args.insert(ARG_PASSWORD.to_string(), password.clone());
        }

        let response = connection.request(AUTHENTICATE_REQUEST, args).await?;
        if response.is_ok() {
            Ok(AuthenticationResult::ok(credentials.user))
        } else {
            Ok(AuthenticationResult::failed(response.status))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_core::{Connection, ConnectionConfig};
    use relay_proto::{Response, TextSerializer};
    use tokio::net::TcpListener;

    use super::*;
    use crate::auth::{AllowAllUsers, UserProvider};

    #[tokio::test]
    async fn wire_handshake_succeeds_against_a_listening_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server_task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.expect("accept");
            let server = Connection::from_accepted(
                peer.to_string(),
                stream,
                Arc::new(TextSerializer),
                ConnectionConfig::default(),
            );
            let request = server.recv_request().await.expect("authenticate request arrives");
            assert_eq!(request.name, AUTHENTICATE_REQUEST);
            let user = request.args.get(ARG_USER).cloned().unwrap_or_default();
            let outcome = AllowAllUsers.check(&user, None).await;
            let response = match outcome {
                crate::auth::AuthOutcome::Accepted => Response::ok(request.request_id),
                crate::auth::AuthOutcome::Rejected(code) => Response::error(request.request_id, code),
            };
            server.send_response(response).await.expect("send response");
        });

        let client = Connection::dial(addr.to_string(), Arc::new(TextSerializer), ConnectionConfig::default())
            .await
            .expect("dial");
        let result = WireHandshake.authenticate(&client, Credentials::new("userA")).await.expect("handshake");
        assert!(result.successful);
        assert_eq!(result.user, "userA");

        server_task.await.expect("server task");
    }

    #[tokio::test]
    async fn wire_handshake_surfaces_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server_task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.expect("accept");
            let server = Connection::from_accepted(
                peer.to_string(),
                stream,
                Arc::new(TextSerializer),
                ConnectionConfig::default(),
            );
            let request = server.recv_request().await.expect("authenticate request arrives");
            server
                .send_response(Response::error(request.request_id, "unknown_user"))
                .await
                .expect("send response");
        });

        let client = Connection::dial(addr.to_string(), Arc::new(TextSerializer), ConnectionConfig::default())
            .await
            .expect("dial");
        let result = WireHandshake.authenticate(&client, Credentials::new("ghost")).await.expect("handshake runs");
        assert!(!result.successful);
        assert_eq!(result.error_code.as_deref(), Some("unknown_user"));

        server_task.await.expect("server task");
    }
}
