//! Frame transport layer: the length-prefixed unit carrying one packet.
//!
//! A frame is pure wire format — `frame_id` plus a payload length plus the
//! payload bytes. It knows nothing about packet envelopes; `payload` is
//! whatever bytes the caller hands it (in practice, an encoded
//! [`crate::packet::Packet`]).

use bytes::Bytes;

use crate::error::CodecError;

/// Size, in bytes, of the frame's fixed prefix (`frame_id` + `payload_length`).
pub const PREFIX_SIZE: usize = 12;
/// Maximum permitted payload length, inclusive.
pub const MAX_PAYLOAD_LEN: i32 = 5_000_000;

/// One length-prefixed frame: `frame_id` (u64 LE) ‖ `payload_length` (i32 LE)
/// ‖ `payload`.
///
/// `payload` is [`Bytes`] rather than `Vec<u8>` so that handing a frame off
/// to a concurrent dispatch task (the read loop never awaits it) is a cheap
/// refcount bump, not a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender-assigned id, monotonically increasing within a connection's
    /// lifetime. Receivers do not require strict monotonicity.
    pub frame_id: u64,
    /// Payload bytes; `payload.len()` is always in `(0, MAX_PAYLOAD_LEN]`
    /// for a frame built via [`Frame::new`].
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame, validating `payload`'s length against the wire bound.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDataLength`] if `payload` is empty or
    /// exceeds [`MAX_PAYLOAD_LEN`] bytes.
    pub fn new(frame_id: u64, payload: impl Into<Bytes>) -> Result<Self, CodecError> {
        let payload = payload.into();
        validate_len(payload.len())?;
        Ok(Self { frame_id, payload })
    }

    /// Encode the frame's 12-byte prefix (`frame_id` ‖ `payload_length`).
    ///
    /// The payload itself is not appended; callers write it separately so
    /// the send path can serialize the three writes without an extra copy.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDataLength`] if the payload length is
    /// out of bounds or does not fit in an `i32`.
    pub fn encode_prefix(&self) -> Result<[u8; PREFIX_SIZE], CodecError> {
        validate_len(self.payload.len())?;
        let mut out = [0u8; PREFIX_SIZE];
        out[..8].copy_from_slice(&self.frame_id.to_le_bytes());
        let len = i32::try_from(self.payload.len())
            .map_err(|_| CodecError::InvalidDataLength(self.payload.len() as i64))?;
        out[8..12].copy_from_slice(&len.to_le_bytes());
        Ok(out)
    }

    /// Encode the complete frame (prefix + payload) into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDataLength`] if the payload length is out
    /// of bounds.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(&self.encode_prefix()?);
        out.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Decode a complete frame from `bytes`, which must contain exactly the
    /// prefix plus the advertised payload length (no trailing bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::HeaderTruncated`] if `bytes` is shorter than
    /// the prefix, or [`CodecError::InvalidDataLength`] if the advertised
    /// length is out of bounds or does not match the remaining bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < PREFIX_SIZE {
            return Err(CodecError::HeaderTruncated { len: bytes.len(), need: PREFIX_SIZE });
        }
        let frame_id = u64::from_le_bytes(bytes[0..8].try_into().unwrap_or_else(|_| [0u8; 8]));
        let payload_length = i32::from_le_bytes(
            bytes[8..12].try_into().unwrap_or_else(|_| [0u8; 4]),
        );
        validate_len_i32(payload_length)?;
        let payload_length = payload_length as usize;
        let end = PREFIX_SIZE
            .checked_add(payload_length)
            .ok_or(CodecError::InvalidDataLength(payload_length as i64))?;
        if bytes.len() != end {
            return Err(CodecError::InvalidDataLength(payload_length as i64));
        }
        Ok(Self { frame_id, payload: Bytes::copy_from_slice(&bytes[PREFIX_SIZE..end]) })
    }

    /// Parse the `payload_length` out of a raw 4-byte little-endian prefix,
    /// validating it against the wire bound. Used by the read loop after
    /// reading exactly 4 bytes, before allocating a buffer for the payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDataLength`] if the length is `<= 0` or
    /// exceeds [`MAX_PAYLOAD_LEN`].
    pub fn parse_payload_length(bytes: [u8; 4]) -> Result<usize, CodecError> {
        let len = i32::from_le_bytes(bytes);
        validate_len_i32(len)?;
        Ok(len as usize)
    }
}

fn validate_len(len: usize) -> Result<(), CodecError> {
    if len == 0 || len as i64 > i64::from(MAX_PAYLOAD_LEN) {
        return Err(CodecError::InvalidDataLength(len as i64));
    }
    Ok(())
}

fn validate_len_i32(len: i32) -> Result<(), CodecError> {
    if len <= 0 || len > MAX_PAYLOAD_LEN {
        return Err(CodecError::InvalidDataLength(i64::from(len)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn frame_round_trip() {
        let frame = Frame::new(7, vec![1, 2, 3, 4]).expect("valid frame");
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode");
        let decoded = Frame::decode(&buf).expect("decode");
        assert_eq!(frame, decoded);
    }

    #[test]
    fn payload_len_one_succeeds() {
        assert!(Frame::new(1, vec![0u8]).is_ok());
    }

    #[test]
    fn payload_len_at_max_succeeds() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN as usize];
        assert!(Frame::new(1, payload).is_ok());
    }

    #[test]
    fn empty_payload_rejected() {
        let err = Frame::new(1, Vec::new()).expect_err("should reject");
        assert!(matches!(err, CodecError::InvalidDataLength(0)));
    }

    #[test]
    fn oversize_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN as usize + 1];
        let err = Frame::new(1, payload).expect_err("should reject");
        assert!(matches!(err, CodecError::InvalidDataLength(_)));
    }

    #[test]
    fn truncated_prefix_is_rejected() {
        let err = Frame::decode(&[0u8; PREFIX_SIZE - 1]).expect_err("should reject");
        assert!(matches!(err, CodecError::HeaderTruncated { .. }));
    }

    #[test]
    fn mismatched_length_is_rejected() {
        let frame = Frame::new(1, vec![1, 2, 3]).expect("valid frame");
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode");
        buf.push(0xFF); // trailing byte not accounted for by payload_length
        let err = Frame::decode(&buf).expect_err("should reject");
        assert!(matches!(err, CodecError::InvalidDataLength(_)));
    }

    proptest! {
        #[test]
        fn prop_frame_round_trip(frame_id in any::<u64>(), payload in prop::collection::vec(any::<u8>(), 1..2048)) {
            let frame = Frame::new(frame_id, payload).expect("valid frame");
            let mut buf = Vec::new();
            frame.encode(&mut buf).expect("encode");
            let decoded = Frame::decode(&buf).expect("decode");
            prop_assert_eq!(frame, decoded);
        }
    }
}
