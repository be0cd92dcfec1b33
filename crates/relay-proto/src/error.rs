//! Codec error taxonomy.

use thiserror::Error;

/// Failures that can occur while encoding or decoding a packet envelope.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer handed to [`crate::envelope::PacketEnvelope::decode`] was
    /// shorter than [`crate::envelope::HEADER_SIZE`].
    #[error("header truncated: got {len} bytes, need at least {need}")]
    HeaderTruncated {
        /// Bytes actually available.
        len: usize,
        /// Bytes required to hold a full header.
        need: usize,
    },

    /// A textual header field's UTF-8 byte length exceeds its fixed width.
    #[error("field {field} overflows its {width}-byte width")]
    FieldOverflow {
        /// Name of the offending field (`destination`, `origin`, `sent`).
        field: &'static str,
        /// Fixed width of the field, in bytes.
        width: usize,
    },

    /// `packet_type` is not present in the type registry.
    #[error("packet type {0:#04x} is not registered")]
    UnregisteredPacketType(u8),

    /// The `sent` field did not parse as an ISO-8601 timestamp with offset.
    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    /// The body bytes did not decode under the registered body kind.
    #[error("body decode failed for packet type {packet_type:#04x}: {reason}")]
    BodyDecode {
        /// The packet type whose body failed to decode.
        packet_type: u8,
        /// Human-readable decode failure reason.
        reason: String,
    },

    /// A frame's `payload_length` was outside `(0, 5_000_000]`, or the
    /// advertised length did not match the bytes actually supplied.
    #[error("invalid frame payload length: {0}")]
    InvalidDataLength(i64),
}
