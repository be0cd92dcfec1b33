//! Wire framing and packet codec for the relay messaging protocol.
//!
//! This crate is pure codec: no I/O, no async runtime. It defines the
//! on-wire [`Frame`] transport unit, the 170-byte [`PacketEnvelope`] header,
//! the [`Packet`] that ties a header to a lazily-decoded [`body::Body`], the
//! process-wide [`registry`] of `packet_type` tags, and the [`Serializer`]
//! capability bodies are encoded/decoded through. [`crate::error::CodecError`]
//! is the single error type for every failure mode in this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod body;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod packet;
pub mod registry;
pub mod serializer;

pub use body::{Body, Request, Response, UNHANDLED_SERVER_ERROR};
pub use envelope::{DEST_WIDTH, FLAG_ONE_WAY, FLAG_REQUEST, FLAG_RESPONSE, HEADER_SIZE, ORIGIN_WIDTH, PacketEnvelope, SENT_WIDTH};
pub use error::CodecError;
pub use frame::{Frame, MAX_PAYLOAD_LEN, PREFIX_SIZE};
pub use packet::Packet;
pub use registry::{BodyKind, PACKET_TYPE_REQUEST, PACKET_TYPE_RESPONSE};
pub use serializer::{Serializer, TextSerializer};
