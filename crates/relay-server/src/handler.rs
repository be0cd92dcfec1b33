//! Server-side dispatch for inbound requests arriving after a connection has
//! authenticated.
//!
//! This mirrors `relay_core::session`'s `RequestReceivedHandler` shape, but
//! on the listener side there is no [`relay_core::session::Session`] to bind
//! the handler to — the listener drives [`relay_core::connection::Connection`]
//! directly (see [`crate::listener`]), so the trait here takes the
//! connection and the authenticated user identifier instead.

use async_trait::async_trait;
use relay_core::connection::Connection;
use relay_proto::{Request, Response};

/// Handles one inbound request for an authenticated connection.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce a response for `request`, arriving on behalf of `user`.
    async fn handle(&self, user: &str, connection: &Connection, request: Request) -> Response;
}

/// Replies `"ok"` to every request, echoing its argument map back as the
/// response body (textual `key=value` lines). Used by the example binary
/// and by tests that only need to exercise the accept/dispatch plumbing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(&self, _user: &str, _connection: &Connection, request: Request) -> Response {
        let mut body = String::new();
        for (key, value) in &request.args {
            body.push_str(&format!("{key}={value}\n"));
        }
        Response::ok(request.request_id).with_body(body.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_core::ConnectionConfig;
    use relay_proto::TextSerializer;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn echo_handler_reflects_arguments() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let accept = tokio::spawn(async move { listener.accept().await.expect("accept") });
        let _client = tokio::net::TcpStream::connect(addr).await.expect("connect");
        let (stream, peer) = accept.await.expect("join");

        let connection = Connection::from_accepted(
            peer.to_string(),
            stream,
            Arc::new(TextSerializer),
            ConnectionConfig::default(),
        );

        let request = Request::new("echo").with_arg("k", "v");
        let request_id = request.request_id;
        let response = EchoHandler.handle("userA", &connection, request).await;

        assert!(response.is_ok());
        assert_eq!(response.request_id, request_id);
        let body = String::from_utf8(response.body.expect("body")).expect("utf8");
        assert_eq!(body, "k=v\n");
    }
}
