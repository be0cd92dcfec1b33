//! Property-based tests for frame and envelope encoding/decoding.
//!
//! These verify round-trip and boundary behavior hold for arbitrary inputs,
//! not just hand-picked examples.

use proptest::prelude::*;
use relay_proto::envelope::{DEST_WIDTH, ORIGIN_WIDTH, PacketEnvelope, SENT_WIDTH};
use relay_proto::frame::{Frame, MAX_PAYLOAD_LEN, PREFIX_SIZE};

fn arbitrary_ascii(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::char::range('a', 'z'), 0..max_len)
        .prop_map(|chars| chars.into_iter().collect())
}

#[test]
fn prop_frame_roundtrip() {
    proptest!(|(frame_id in any::<u64>(), payload in prop::collection::vec(any::<u8>(), 1..4096))| {
        let frame = Frame::new(frame_id, payload).expect("valid frame");
        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("encode");
        let decoded = Frame::decode(&wire).expect("decode");
        prop_assert_eq!(frame, decoded);
    });
}

#[test]
fn prop_frame_boundary_lengths() {
    // payload_length = 1 and 5_000_000 both succeed.
    assert!(Frame::new(1, vec![0u8; 1]).is_ok());
    assert!(Frame::new(1, vec![0u8; MAX_PAYLOAD_LEN as usize]).is_ok());
    // 0 and 5_000_001 both fail.
    assert!(Frame::new(1, Vec::new()).is_err());
    assert!(Frame::new(1, vec![0u8; MAX_PAYLOAD_LEN as usize + 1]).is_err());
}

#[test]
fn prop_frame_prefix_size_is_twelve_bytes() {
    assert_eq!(PREFIX_SIZE, 12);
}

#[test]
fn prop_envelope_header_roundtrip() {
    proptest!(|(
        destination in arbitrary_ascii(DEST_WIDTH),
        origin in arbitrary_ascii(ORIGIN_WIDTH),
    )| {
        let env = PacketEnvelope::new(0x01, 0, destination.clone(), origin.clone());
        let mut buf = Vec::new();
        env.encode(&mut buf).expect("encode");
        let decoded = PacketEnvelope::decode(&buf).expect("decode");
        prop_assert_eq!(decoded.destination, destination);
        prop_assert_eq!(decoded.origin, origin);
    });
}

#[test]
fn prop_envelope_exact_width_boundaries_roundtrip() {
    let destination = "d".repeat(DEST_WIDTH);
    let origin = "o".repeat(ORIGIN_WIDTH);
    let env = PacketEnvelope::new(0x01, 0, destination.clone(), origin.clone());
    let mut buf = Vec::new();
    env.encode(&mut buf).expect("encode");
    assert_eq!(buf.len(), relay_proto::HEADER_SIZE);
    let decoded = PacketEnvelope::decode(&buf).expect("decode");
    assert_eq!(decoded.destination, destination);
    assert_eq!(decoded.origin, origin);
    assert!(decoded.sent.len() <= SENT_WIDTH);
}

#[test]
fn prop_envelope_oversized_fields_overflow() {
    let destination = "d".repeat(DEST_WIDTH + 1);
    let env = PacketEnvelope::new(0x01, 0, destination, "");
    let mut buf = Vec::new();
    assert!(env.encode(&mut buf).is_err());
}
