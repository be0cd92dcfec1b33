//! The serializer capability.
//!
//! The codec never hard-codes a wire format for request/response bodies;
//! it consumes whatever [`Serializer`] the connection was configured with.
//! [`TextSerializer`] is the reference implementation used by this
//! workspace's tests and example binary — a line-oriented, XML-like textual
//! encoding, not a format the core depends on.

use std::collections::HashMap;

use crate::body::{Request, Response};
use crate::error::CodecError;

/// Capability for encoding and decoding request/response bodies.
///
/// Concrete implementations (binary, XML, JSON, ...) live outside this
/// crate; the core only ever calls through this trait.
pub trait Serializer: Send + Sync {
    /// Encode a request body to bytes.
    fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError>;
    /// Decode a request body from bytes.
    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError>;
    /// Encode a response body to bytes.
    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError>;
    /// Decode a response body from bytes.
    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError>;
}

/// Line-oriented, XML-like textual serializer: `key=value` pairs, one per
/// line, with request arguments prefixed `arg.`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSerializer;

impl Serializer for TextSerializer {
    fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        let mut out = format!("id={}\nname={}\n", request.request_id, escape(&request.name));
        for (key, value) in &request.args {
            out.push_str(&format!("arg.{}={}\n", escape(key), escape(value)));
        }
        Ok(out.into_bytes())
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CodecError::BodyDecode { packet_type: 0x01, reason: e.to_string() })?;

        let mut request_id = 0u64;
        let mut name = String::new();
        let mut args = HashMap::new();

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else { continue };
            if key == "id" {
                request_id = value.parse().unwrap_or(0);
            } else if key == "name" {
                name = unescape(value);
            } else if let Some(arg_key) = key.strip_prefix("arg.") {
                args.insert(unescape(arg_key), unescape(value));
            }
        }

        Ok(Request { request_id, name, args })
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        let mut out = format!("id={}\nstatus={}\n", response.request_id, escape(&response.status));
        if let Some(body) = &response.body {
            out.push_str(&format!("body={}\n", hex_encode(body)));
        }
        Ok(out.into_bytes())
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CodecError::BodyDecode { packet_type: 0x02, reason: e.to_string() })?;

        let mut request_id = 0u64;
        let mut status = String::new();
        let mut body = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else { continue };
            match key {
                "id" => request_id = value.parse().unwrap_or(0),
                "status" => status = unescape(value),
                "body" => body = hex_decode(value),
                _ => {},
            }
        }

        Ok(Response { request_id, status, body })
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n").replace('=', "\\=")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('=') => out.push('='),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {},
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let ser = TextSerializer;
        let req = Request::new("test").with_arg("k", "v=1\n2");
        let bytes = ser.encode_request(&req).expect("encode");
        let decoded = ser.decode_request(&bytes).expect("decode");
        assert_eq!(decoded.name, "test");
        assert_eq!(decoded.args.get("k"), Some(&"v=1\n2".to_string()));
    }

    #[test]
    fn response_round_trip_with_body() {
        let ser = TextSerializer;
        let resp = Response::ok(42).with_body(vec![1, 2, 3, 255]);
        let bytes = ser.encode_response(&resp).expect("encode");
        let decoded = ser.decode_response(&bytes).expect("decode");
        assert_eq!(decoded.request_id, 42);
        assert_eq!(decoded.body, Some(vec![1, 2, 3, 255]));
    }

    #[test]
    fn error_status_round_trips() {
        let ser = TextSerializer;
        let resp = Response::error(7, "bad_request");
        let bytes = ser.encode_response(&resp).expect("encode");
        let decoded = ser.decode_response(&bytes).expect("decode");
        assert!(!decoded.is_ok());
        assert_eq!(decoded.status, "bad_request");
    }
}
