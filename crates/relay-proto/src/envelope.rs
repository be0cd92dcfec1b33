//! Fixed-header packet envelope: 170 bytes of routing metadata ahead of a
//! polymorphic body.
//!
//! The header is zero-copy castable so the routing hot path (read
//! `packet_type`/`destination`/`origin` off the wire) never has to touch or
//! allocate for the body.

use time::OffsetDateTime;
use time::macros::format_description;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::CodecError;

/// Size, in bytes, of the packet envelope header (type + flags + destination
/// + origin + sent).
pub const HEADER_SIZE: usize = 170;
/// Fixed width, in bytes, of the `destination` field.
pub const DEST_WIDTH: usize = 64;
/// Fixed width, in bytes, of the `origin` field.
pub const ORIGIN_WIDTH: usize = 64;
/// Fixed width, in bytes, of the `sent` field.
pub const SENT_WIDTH: usize = 40;

/// Reserved bit for request packets.
pub const FLAG_REQUEST: u8 = 0b0000_0001;
/// Reserved bit for response packets.
pub const FLAG_RESPONSE: u8 = 0b0000_0010;
/// Reserved bit for one-way (no response expected) packets.
pub const FLAG_ONE_WAY: u8 = 0b0000_0100;

const TIMESTAMP_FORMAT: &[time::format_description::BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:7][offset_hour sign:mandatory]:[offset_minute]"
);

/// Raw, zero-copy wire layout of the 170-byte header.
///
/// All fields are byte arrays (alignment 1), so this type casts directly
/// onto a wire buffer with no padding and no endianness concerns of its own.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone, Copy)]
pub struct RawHeader {
    packet_type: u8,
    flags: u8,
    destination: [u8; DEST_WIDTH],
    origin: [u8; ORIGIN_WIDTH],
    sent: [u8; SENT_WIDTH],
}

impl std::fmt::Debug for RawHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHeader")
            .field("packet_type", &self.packet_type)
            .field("flags", &self.flags)
            .field("destination", &String::from_utf8_lossy(&self.destination))
            .field("origin", &String::from_utf8_lossy(&self.origin))
            .field("sent", &String::from_utf8_lossy(&self.sent))
            .finish()
    }
}

/// Decoded packet envelope header: routing metadata shared by every packet
/// type, independent of the body schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEnvelope {
    /// Registered body schema tag.
    pub packet_type: u8,
    /// Reserved intent bitmask (`FLAG_REQUEST`/`FLAG_RESPONSE`/`FLAG_ONE_WAY`).
    pub flags: u8,
    /// Destination identifier, at most 64 UTF-8 bytes.
    pub destination: String,
    /// Origin (sender) identifier, at most 64 UTF-8 bytes. May be empty on
    /// pre-authentication client-to-server traffic.
    pub origin: String,
    /// Send timestamp, ISO-8601 with offset.
    pub sent: String,
}

impl PacketEnvelope {
    /// Build an envelope, stamping `sent` with the current time.
    #[must_use]
    pub fn new(packet_type: u8, flags: u8, destination: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            packet_type,
            flags,
            destination: destination.into(),
            origin: origin.into(),
            sent: format_timestamp(OffsetDateTime::now_utc()),
        }
    }

    /// Encode the header into `out`, writing exactly [`HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FieldOverflow`] if `destination`, `origin`, or
    /// `sent` exceed their fixed widths once UTF-8 encoded.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut destination = [0u8; DEST_WIDTH];
        write_fixed("destination", &self.destination, &mut destination)?;
        let mut origin = [0u8; ORIGIN_WIDTH];
        write_fixed("origin", &self.origin, &mut origin)?;
        let mut sent = [0u8; SENT_WIDTH];
        write_fixed("sent", &self.sent, &mut sent)?;

        let raw =
            RawHeader { packet_type: self.packet_type, flags: self.flags, destination, origin, sent };
        out.extend_from_slice(raw.as_bytes());
        Ok(())
    }

    /// Decode the header from the front of `bytes`.
    ///
    /// Does not touch or validate the body; `bytes` may contain trailing
    /// body data beyond [`HEADER_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::HeaderTruncated`] if `bytes` is shorter than
    /// [`HEADER_SIZE`], or [`CodecError::MalformedTimestamp`] if the `sent`
    /// field does not parse as ISO-8601.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::HeaderTruncated { len: bytes.len(), need: HEADER_SIZE });
        }
        let raw = RawHeader::ref_from_bytes(&bytes[..HEADER_SIZE])
            .map_err(|_| CodecError::HeaderTruncated { len: bytes.len(), need: HEADER_SIZE })?;

        let destination = read_fixed(&raw.destination)?;
        let origin = read_fixed(&raw.origin)?;
        let sent = read_fixed(&raw.sent)?;

        // Validate shape eagerly (routing code inspects packet_type/destination
        // without decoding the body, but a malformed timestamp is still a
        // header-level defect worth surfacing here rather than deferring).
        parse_timestamp(&sent)?;

        Ok(Self { packet_type: raw.packet_type, flags: raw.flags, destination, origin, sent })
    }
}

fn write_fixed(field: &'static str, value: &str, dst: &mut [u8]) -> Result<(), CodecError> {
    let bytes = value.as_bytes();
    if bytes.len() > dst.len() {
        return Err(CodecError::FieldOverflow { field, width: dst.len() });
    }
    dst[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn read_fixed(src: &[u8]) -> Result<String, CodecError> {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8(src[..end].to_vec())
        .map_err(|e| CodecError::MalformedTimestamp(e.to_string()))
}

/// Format an [`OffsetDateTime`] the way the wire expects: ISO-8601 extended,
/// 7-digit fractional seconds, explicit offset.
#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).unwrap_or_else(|_| "1970-01-01T00:00:00.0000000+00:00".to_string())
}

/// Parse a wire timestamp string back into an [`OffsetDateTime`].
///
/// # Errors
///
/// Returns [`CodecError::MalformedTimestamp`] if `s` is not valid ISO-8601
/// with offset.
pub fn parse_timestamp(s: &str) -> Result<OffsetDateTime, CodecError> {
    OffsetDateTime::parse(s, TIMESTAMP_FORMAT).map_err(|e| CodecError::MalformedTimestamp(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let env = PacketEnvelope::new(0x01, FLAG_REQUEST, "room-7", "userA");
        let mut buf = Vec::new();
        env.encode(&mut buf).expect("encode");
        assert_eq!(buf.len(), HEADER_SIZE);
        let decoded = PacketEnvelope::decode(&buf).expect("decode");
        assert_eq!(env, decoded);
    }

    #[test]
    fn destination_at_exact_width_round_trips() {
        let destination = "d".repeat(DEST_WIDTH);
        let env = PacketEnvelope::new(0x01, 0, destination.clone(), "");
        let mut buf = Vec::new();
        env.encode(&mut buf).expect("encode");
        let decoded = PacketEnvelope::decode(&buf).expect("decode");
        assert_eq!(decoded.destination, destination);
    }

    #[test]
    fn oversized_destination_fails() {
        let destination = "d".repeat(DEST_WIDTH + 1);
        let env = PacketEnvelope::new(0x01, 0, destination, "");
        let mut buf = Vec::new();
        let err = env.encode(&mut buf).expect_err("should overflow");
        assert!(matches!(err, CodecError::FieldOverflow { field: "destination", width: DEST_WIDTH }));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let short = vec![0u8; HEADER_SIZE - 1];
        let err = PacketEnvelope::decode(&short).expect_err("should truncate");
        assert!(matches!(err, CodecError::HeaderTruncated { .. }));
    }

    #[test]
    fn empty_origin_round_trips() {
        let env = PacketEnvelope::new(0x02, FLAG_RESPONSE, "userA", "");
        let mut buf = Vec::new();
        env.encode(&mut buf).expect("encode");
        let decoded = PacketEnvelope::decode(&buf).expect("decode");
        assert_eq!(decoded.origin, "");
    }
}
