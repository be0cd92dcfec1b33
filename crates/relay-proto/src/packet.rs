//! Ties the envelope header to a lazily-decoded body.

use crate::body::Body;
use crate::envelope::{HEADER_SIZE, PacketEnvelope};
use crate::error::CodecError;
use crate::registry::{self, BodyKind};
use crate::serializer::Serializer;

/// A fully framed packet: header plus undecoded body bytes.
///
/// The body is not decoded until [`Packet::body`] is called, so routing
/// logic that only needs `packet_type`/`destination`/`origin` never pays for
/// body deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Decoded header.
    pub envelope: PacketEnvelope,
    body_bytes: Vec<u8>,
}

impl Packet {
    /// Build a packet from an encoded body and header.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnregisteredPacketType`] if `envelope.packet_type`
    /// has no entry in the process-wide type registry, or a body-encoding
    /// error from `serializer`.
    pub fn from_body(
        envelope: PacketEnvelope,
        body: &Body,
        serializer: &dyn Serializer,
    ) -> Result<Self, CodecError> {
        match registry::lookup(envelope.packet_type) {
            Some(BodyKind::Request) => {
                let Body::Request(request) = body else {
                    return Err(CodecError::BodyDecode {
                        packet_type: envelope.packet_type,
                        reason: "expected request body".to_string(),
                    });
                };
                let body_bytes = serializer.encode_request(request)?;
                Ok(Self { envelope, body_bytes })
            },
            Some(BodyKind::Response) => {
                let Body::Response(response) = body else {
                    return Err(CodecError::BodyDecode {
                        packet_type: envelope.packet_type,
                        reason: "expected response body".to_string(),
                    });
                };
                let body_bytes = serializer.encode_response(response)?;
                Ok(Self { envelope, body_bytes })
            },
            Some(BodyKind::Opaque) => {
                let Body::Opaque(bytes) = body else {
                    return Err(CodecError::BodyDecode {
                        packet_type: envelope.packet_type,
                        reason: "expected opaque body".to_string(),
                    });
                };
                Ok(Self { envelope, body_bytes: bytes.clone() })
            },
            None => Err(CodecError::UnregisteredPacketType(envelope.packet_type)),
        }
    }

    /// Encode the full packet (header + body) into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FieldOverflow`] if a header field overflows its
    /// fixed width.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.envelope.encode(out)?;
        out.extend_from_slice(&self.body_bytes);
        Ok(())
    }

    /// Decode header and raw body bytes from a full packet payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::HeaderTruncated`] if `bytes` is shorter than the
    /// header, or [`CodecError::UnregisteredPacketType`] if the header's
    /// `packet_type` is not registered.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let envelope = PacketEnvelope::decode(bytes)?;
        if registry::lookup(envelope.packet_type).is_none() {
            return Err(CodecError::UnregisteredPacketType(envelope.packet_type));
        }
        let body_bytes = bytes[HEADER_SIZE..].to_vec();
        Ok(Self { envelope, body_bytes })
    }

    /// Decode the body on demand using `serializer`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnregisteredPacketType`] if the registry entry
    /// for this packet's type has since been removed (never happens in
    /// practice, since the registry is append-only), or a body-decoding
    /// error from `serializer`.
    pub fn body(&self, serializer: &dyn Serializer) -> Result<Body, CodecError> {
        match registry::lookup(self.envelope.packet_type) {
            Some(BodyKind::Request) => Ok(Body::Request(serializer.decode_request(&self.body_bytes)?)),
            Some(BodyKind::Response) => {
                Ok(Body::Response(serializer.decode_response(&self.body_bytes)?))
            },
            Some(BodyKind::Opaque) => Ok(Body::Opaque(self.body_bytes.clone())),
            None => Err(CodecError::UnregisteredPacketType(self.envelope.packet_type)),
        }
    }

    /// Raw, undecoded body bytes.
    #[must_use]
    pub fn raw_body(&self) -> &[u8] {
        &self.body_bytes
    }
}
