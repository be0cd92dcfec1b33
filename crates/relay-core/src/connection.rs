//! A single framed connection: dialing, the handshake-coupled read loop, and
//! the request/response send path.
//!
//! `Connection` is transport-origin agnostic. [`Connection::dial`] drives
//! the outbound side (DNS resolution, ordered connect attempts);
//! [`Connection::from_accepted`] wraps an already-open socket on the
//! listener side. Both converge on the same read loop and request API once
//! a stream is in hand — the origin only changes which state the machine
//! starts transitioning from (`Connecting` for a dialer, straight to
//! `Handshaking` for a listener, per [`crate::state::ConnectionState`]).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use relay_proto::{
    Body, FLAG_REQUEST, FLAG_RESPONSE, PACKET_TYPE_REQUEST, PACKET_TYPE_RESPONSE, Packet, PacketEnvelope,
    Request, Response, Serializer,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, RwLock as AsyncRwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::correlator::{self, Correlator, DEFAULT_REQUEST_TIMEOUT};
use crate::error::ConnectionError;
use crate::frame_io::{FrameReader, FrameWriter};
use crate::state::{ConnectionState, StateMachine};

/// Number of attempts the DNS resilience helper makes before giving up on a
/// lookup that keeps failing with a transient error.
const DNS_RETRY_ATTEMPTS: u32 = 3;
/// Delay between DNS retry attempts.
const DNS_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Tunables for a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for an individual outstanding request. See
    /// [`crate::correlator::DEFAULT_REQUEST_TIMEOUT`].
    pub request_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { request_timeout: DEFAULT_REQUEST_TIMEOUT }
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A single connection to a remote peer: one framed transport, one lifecycle
/// state machine, one request correlator.
///
/// Held behind `Arc` once handed to a caller, since the read loop and any
/// number of concurrent `request`/`send_response` callers all need shared
/// access.
pub struct Connection {
    remote_address: String,
    listener_origin: bool,
    serializer: Arc<dyn Serializer>,
    state: StateMachine,
    correlator: Correlator,
    next_frame_id: AtomicU64,
    last_frame_id_seen: AtomicU64,
    writer: AsyncMutex<Option<FrameWriter<BoxedWriter>>>,
    inbound_tx: mpsc::UnboundedSender<Request>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<Request>>,
    closed: CancellationToken,
    local_identity: AsyncRwLock<String>,
    config: ConnectionConfig,
}

impl Connection {
    fn new(
        remote_address: String,
        listener_origin: bool,
        serializer: Arc<dyn Serializer>,
        config: ConnectionConfig,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            remote_address,
            listener_origin,
            serializer,
            state: StateMachine::new(),
            correlator: Correlator::new(config.request_timeout),
            next_frame_id: AtomicU64::new(1),
            last_frame_id_seen: AtomicU64::new(0),
            writer: AsyncMutex::new(None),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            closed: CancellationToken::new(),
            local_identity: AsyncRwLock::new(String::new()),
            config,
        }
    }

    /// Wrap an already-accepted socket as a listener-origin connection.
    ///
    /// Starts the read loop immediately and transitions straight to
    /// [`ConnectionState::Handshaking`] — a listener-origin connection has
    /// no `Connecting` phase, the socket is already open.
    #[must_use]
    pub fn from_accepted(
        remote_address: impl Into<String>,
        stream: TcpStream,
        serializer: Arc<dyn Serializer>,
        config: ConnectionConfig,
    ) -> Arc<Self> {
        let connection = Arc::new(Self::new(remote_address.into(), true, serializer, config));
        let (read_half, write_half) = stream.into_split();
        connection.spawn(Box::new(read_half), Box::new(write_half));
        connection
    }

    /// Dial `remote_address` (`host:port`), resolving and connecting per the
    /// ordered-attempt algorithm: resolve the host via a DNS lookup wrapped
    /// in a small retry helper, then try each resolved address in turn,
    /// taking the first that accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Format`] if `remote_address` does not
    /// parse as `host:port`, or [`ConnectionError::CouldNotConnect`] if
    /// resolution or every connect attempt fails.
    pub async fn dial(
        remote_address: impl Into<String>,
        serializer: Arc<dyn Serializer>,
        config: ConnectionConfig,
    ) -> Result<Arc<Self>, ConnectionError> {
        let remote_address = remote_address.into();
        let connection = Arc::new(Self::new(remote_address.clone(), false, serializer, config));
        connection.state.transition(ConnectionState::Connecting);

        let stream = dial_tcp(&remote_address, &connection.closed).await?;
        let (read_half, write_half) = stream.into_split();
        connection.spawn(Box::new(read_half), Box::new(write_half));
        Ok(connection)
    }

    /// Install the writer half and spawn the read loop, transitioning to
    /// `Handshaking`.
    ///
    /// The read loop must be running before the first handshake request is
    /// sent: the handshake's response arrives on that same loop, so sending
    /// before spawning it would deadlock the handshake waiting on a reader
    /// that never starts.
    fn spawn(self: &Arc<Self>, reader: BoxedReader, writer: BoxedWriter) {
        // A plain `try_lock` is enough here: nothing else can be contending
        // for the writer slot before the connection has been handed to a
        // caller, so this never actually blocks.
        if let Ok(mut guard) = self.writer.try_lock() {
            *guard = Some(FrameWriter::new(writer));
        }
        self.state.transition(ConnectionState::Handshaking);

        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.run_read_loop(reader).await });
    }

    async fn run_read_loop(self: Arc<Self>, reader: BoxedReader) {
        let mut frames = FrameReader::new(reader);
        loop {
            let read = tokio::select! {
                () = self.closed.cancelled() => break,
                read = frames.read_frame() => read,
            };
            let (frame_id, payload) = match read {
                Ok(pair) => pair,
                Err(err) => {
                    debug!(remote = %self.remote_address, %err, "read loop ending");
                    break;
                },
            };
            self.note_frame_id(frame_id);

            let packet = match Packet::decode(&payload) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!(remote = %self.remote_address, %err, "closing connection: malformed packet");
                    break;
                },
            };
            let body = match packet.body(self.serializer.as_ref()) {
                Ok(body) => body,
                Err(err) => {
                    warn!(remote = %self.remote_address, %err, "closing connection: body decode failed");
                    break;
                },
            };
            match body {
                Body::Response(response) => self.correlator.resolve(response),
                Body::Request(request) => {
                    if self.inbound_tx.send(request).is_err() {
                        debug!(remote = %self.remote_address, "no dispatcher listening, dropping inbound request");
                    }
                },
                Body::Opaque(_) => {
                    crate::signal::global().signal(
                        "read_loop",
                        format!(
                            "{}: discarding opaque inbound packet, packet_type={:#04x}",
                            self.remote_address, packet.envelope.packet_type
                        ),
                    );
                },
            }
        }
        self.close();
    }

    fn note_frame_id(&self, frame_id: u64) {
        let previous = self.last_frame_id_seen.swap(frame_id, Ordering::Relaxed);
        if previous != 0 && frame_id != previous.wrapping_add(1) {
            crate::signal::global().signal(
                "read_loop",
                format!(
                    "{}: frame id gap on inbound stream, expected={} got={}",
                    self.remote_address,
                    previous.wrapping_add(1),
                    frame_id
                ),
            );
        }
    }

    /// Mark the handshake complete. Called by whatever drove the handshake
    /// (a [`crate::auth::Handshake`] on the dialer side, the server's own
    /// acceptance logic on the listener side) once it has decided to accept
    /// the peer.
    pub fn mark_connected(&self) -> bool {
        self.state.transition(ConnectionState::Connected)
    }

    /// Record the authenticated identity to stamp as `origin` on subsequent
    /// outbound packets.
    pub async fn set_local_identity(&self, identity: impl Into<String>) {
        *self.local_identity.write().await = identity.into();
    }

    /// Send a request and await its correlated response.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Disconnected`] if the connection is closed
    /// (or closes mid-flight), a wrapped [`crate::error::CorrelatorError`] on
    /// timeout, or a codec/I/O error from the send path.
    pub async fn request(
        &self,
        name: impl Into<String>,
        args: HashMap<String, String>,
    ) -> Result<Response, ConnectionError> {
        let request_id = self.correlator.next_request_id();
        let mut request = Request::new(name);
        request.request_id = request_id;
        request.args = args;

        let rx = self.correlator.register(request_id);
        let payload = self.encode(PACKET_TYPE_REQUEST, FLAG_REQUEST, Body::Request(request)).await?;
        if let Err(err) = self.send_frame(payload).await {
            self.correlator.forget(request_id);
            return Err(err);
        }
        Ok(correlator::await_response(&self.correlator, request_id, rx).await?)
    }

    /// Send a response for a previously dispatched request.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Disconnected`] if the connection has
    /// closed, or a codec/I/O error from the send path.
    pub async fn send_response(&self, response: Response) -> Result<(), ConnectionError> {
        let payload = self.encode(PACKET_TYPE_RESPONSE, FLAG_RESPONSE, Body::Response(response)).await?;
        self.send_frame(payload).await
    }

    async fn encode(&self, packet_type: u8, flags: u8, body: Body) -> Result<Bytes, ConnectionError> {
        let origin = self.local_identity.read().await.clone();
        let envelope = PacketEnvelope::new(packet_type, flags, String::new(), origin);
        let packet = Packet::from_body(envelope, &body, self.serializer.as_ref())?;
        let mut bytes = Vec::new();
        packet.encode(&mut bytes)?;
        Ok(Bytes::from(bytes))
    }

    async fn send_frame(&self, payload: Bytes) -> Result<(), ConnectionError> {
        if self.closed.is_cancelled() {
            return Err(ConnectionError::Disconnected);
        }
        let frame_id = self.next_frame_id.fetch_add(1, Ordering::Relaxed);
        let guard = self.writer.lock().await;
        let Some(writer) = guard.as_ref() else {
            return Err(ConnectionError::Disconnected);
        };
        let result = writer.send(frame_id, payload).await;
        if let Err(err) = &result {
            if err.is_fatal_to_connection() {
                drop(guard);
                self.close();
            }
        }
        result
    }

    /// Receive the next inbound request, or `None` once the connection has
    /// closed and no more will arrive. A session's dispatch loop polls this.
    pub async fn recv_request(&self) -> Option<Request> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Subscribe to lifecycle state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Remote address this connection was dialed to, or the accepted peer
    /// address for a listener-origin connection.
    #[must_use]
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Whether this connection originated from accepting an inbound socket,
    /// as opposed to [`Connection::dial`].
    #[must_use]
    pub fn is_listener_origin(&self) -> bool {
        self.listener_origin
    }

    /// Close the connection: cancels the closed token (waking any blocked
    /// read/send), transitions to `Closed`, and fails every outstanding
    /// request. Idempotent.
    ///
    /// The underlying socket is released when the last `Arc<Connection>`
    /// (held by the read loop and any callers) is dropped, not synchronously
    /// here.
    pub fn close(&self) {
        if self.state.close() {
            self.closed.cancel();
            self.correlator.fail_all();
        }
    }
}

async fn dial_tcp(remote_address: &str, closed: &CancellationToken) -> Result<TcpStream, ConnectionError> {
    let (host, port) = split_host_port(remote_address)?;
    if closed.is_cancelled() {
        return Err(ConnectionError::Disconnected);
    }

    let addrs = resolve_with_retry(&host, port).await?;
    let mut reasons = Vec::new();
    for addr in addrs {
        if closed.is_cancelled() {
            return Err(ConnectionError::Disconnected);
        }
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) => reasons.push(format!("{addr}: {err}")),
        }
    }
    Err(ConnectionError::CouldNotConnect { host, reasons })
}

fn split_host_port(remote_address: &str) -> Result<(String, u16), ConnectionError> {
    let (host, port) =
        remote_address.rsplit_once(':').ok_or_else(|| ConnectionError::Format(remote_address.to_string()))?;
    let port: u16 = port.parse().map_err(|_| ConnectionError::Format(remote_address.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}

/// DNS lookup wrapped in a small retry helper: a handful of attempts with a
/// short fixed delay, absorbing the transient resolver failures a real
/// resolver occasionally produces under load.
async fn resolve_with_retry(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectionError> {
    let lookup = format!("{host}:{port}");
    let mut last_error = None;
    for attempt in 0..DNS_RETRY_ATTEMPTS {
        match tokio::net::lookup_host(&lookup).await {
            Ok(addrs) => return Ok(addrs.collect()),
            Err(err) => {
                last_error = Some(err.to_string());
                if attempt + 1 < DNS_RETRY_ATTEMPTS {
                    tokio::time::sleep(DNS_RETRY_DELAY).await;
                }
            },
        }
    }
    Err(ConnectionError::CouldNotConnect {
        host: host.to_string(),
        reasons: vec![last_error.unwrap_or_else(|| "dns resolution failed".to_string())],
    })
}

#[cfg(test)]
mod tests {
    use relay_proto::TextSerializer;
    use tokio::net::TcpListener;

    use super::*;

    fn serializer() -> Arc<dyn Serializer> {
        Arc::new(TextSerializer)
    }

    async fn connected_pair() -> (Arc<Connection>, Arc<Connection>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let dial = tokio::spawn(Connection::dial(addr.to_string(), serializer(), ConnectionConfig::default()));
        let (stream, peer) = listener.accept().await.expect("accept");
        let server = Connection::from_accepted(peer.to_string(), stream, serializer(), ConnectionConfig::default());
        let client = dial.await.expect("join").expect("dial");
        (client, server)
    }

    #[tokio::test]
    async fn dial_and_accept_both_reach_handshaking() {
        let (client, server) = connected_pair().await;
        assert_eq!(client.state(), ConnectionState::Handshaking);
        assert_eq!(server.state(), ConnectionState::Handshaking);
        assert!(!client.is_listener_origin());
        assert!(server.is_listener_origin());
    }

    #[tokio::test]
    async fn malformed_remote_address_is_rejected_without_dns() {
        let err = Connection::dial("not-a-valid-address", serializer(), ConnectionConfig::default())
            .await
            .expect_err("should reject");
        assert!(matches!(err, ConnectionError::Format(_)));
    }

    #[tokio::test]
    async fn request_round_trips_through_a_real_socket() {
        let (client, server) = connected_pair().await;
        client.mark_connected();
        server.mark_connected();

        let responder = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let request = server.recv_request().await.expect("request arrives");
                assert_eq!(request.name, "ping");
                server.send_response(Response::ok(request.request_id)).await.expect("send response");
            })
        };

        let response = client.request("ping", HashMap::new()).await.expect("request succeeds");
        assert!(response.is_ok());
        responder.await.expect("responder task");
    }

    #[tokio::test]
    async fn close_fails_outstanding_requests() {
        let (client, server) = connected_pair().await;
        client.mark_connected();
        server.mark_connected();

        let client_for_close = Arc::clone(&client);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            client_for_close.close();
        });

        let err = client.request("never-answered", HashMap::new()).await.expect_err("should fail");
        assert!(matches!(err, ConnectionError::Correlator(_)));
    }

    #[tokio::test]
    async fn send_after_close_is_disconnected() {
        let (client, _server) = connected_pair().await;
        client.close();
        let err = client.request("anything", HashMap::new()).await.expect_err("closed connection");
        assert!(matches!(err, ConnectionError::Disconnected));
    }
}
