//! Low-level frame transport: read-exactly-N framing and the single-writer
//! send path.
//!
//! This module knows nothing about packets, correlation, or lifecycle — it
//! moves `(frame_id, payload)` pairs across an async byte stream, enforcing
//! the wire's length bound and the single-writer invariant.

use bytes::{Bytes, BytesMut};
use relay_proto::frame::{Frame, MAX_PAYLOAD_LEN, PREFIX_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::ConnectionError;

/// Serializes concurrent senders onto one underlying writer so the three
/// logical writes of a frame (id, length, payload) are never interleaved
/// with another sender's bytes.
pub struct FrameWriter<W> {
    inner: AsyncMutex<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap `writer` for exclusive framed writes.
    pub fn new(writer: W) -> Self {
        Self { inner: AsyncMutex::new(writer) }
    }

    /// Write one frame's prefix and payload as a single critical section.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidDataLength`] if `payload` is empty
    /// or exceeds the wire bound, or [`ConnectionError::Io`] on a write
    /// failure.
    pub async fn send(&self, frame_id: u64, payload: Bytes) -> Result<(), ConnectionError> {
        let frame = Frame::new(frame_id, payload)?;
        let prefix = frame.encode_prefix()?;

        let mut guard = self.inner.lock().await;
        guard.write_all(&prefix).await?;
        guard.write_all(&frame.payload).await?;
        guard.flush().await?;
        Ok(())
    }
}

/// One long-running read loop's worth of framing: repeatedly read exactly
/// one frame (id, then length, then payload) off `reader`.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `reader` for sequential framed reads.
    pub fn new(reader: R) -> Self {
        Self { inner: reader }
    }

    /// Read one complete frame.
    ///
    /// A clean EOF on the first byte of `frame_id` is reported as
    /// [`ConnectionError::Disconnected`] (orderly peer close); an EOF
    /// partway through a field is an I/O error, since `read_exact` treats a
    /// short read as `UnexpectedEof`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Disconnected`] on peer close,
    /// [`ConnectionError::InvalidDataLength`] if `payload_length` is outside
    /// `(0, 5_000_000]`, or [`ConnectionError::Io`] on any other I/O
    /// failure.
    pub async fn read_frame(&mut self) -> Result<(u64, Bytes), ConnectionError> {
        let mut id_buf = [0u8; 8];
        match self.inner.read_exact(&mut id_buf).await {
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ConnectionError::Disconnected);
            },
            Err(e) => return Err(ConnectionError::Io(e)),
        }
        let frame_id = u64::from_le_bytes(id_buf);

        let mut len_buf = [0u8; 4];
        self.inner.read_exact(&mut len_buf).await?;
        let payload_length = Frame::parse_payload_length(len_buf)?;
        debug_assert!(payload_length > 0 && payload_length <= MAX_PAYLOAD_LEN as usize);

        let mut payload = BytesMut::zeroed(payload_length);
        self.inner.read_exact(&mut payload).await?;

        Ok((frame_id, payload.freeze()))
    }
}

/// Size of the fixed prefix every frame carries ahead of its payload.
pub const FRAME_PREFIX_SIZE: usize = PREFIX_SIZE;
