//! The two structural body subtypes the core must recognize: requests and
//! responses. Every other `packet_type` carries an opaque body whose schema
//! is private to whatever registered it.

use std::collections::HashMap;

/// A request body: a name plus a free-form argument map, correlated by
/// `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    /// Correlator key, unique within the sending connection's lifetime.
    pub request_id: u64,
    /// Request name, dispatched on by the module registry.
    pub name: String,
    /// Argument map.
    pub args: HashMap<String, String>,
}

impl Request {
    /// Start building a request with a name; `request_id` is assigned by the
    /// correlator at send time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { request_id: 0, name: name.into(), args: HashMap::new() }
    }

    /// Attach an argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// A response body: the originating `request_id`, a status code string, and
/// an optional opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    /// The `request_id` of the request this answers.
    pub request_id: u64,
    /// Status code string. `"ok"` on success; anything else is an error code
    /// (see `UnhandledServerError` for the default failure code).
    pub status: String,
    /// Optional response payload.
    pub body: Option<Vec<u8>>,
}

impl Response {
    /// Build a successful response to `request_id`.
    #[must_use]
    pub fn ok(request_id: u64) -> Self {
        Self { request_id, status: "ok".to_string(), body: None }
    }

    /// Build an error response to `request_id`.
    #[must_use]
    pub fn error(request_id: u64, code: impl Into<String>) -> Self {
        Self { request_id, status: code.into(), body: None }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether this response reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Status code returned to a peer when an inbound-request handler raised
/// instead of completing normally.
pub const UNHANDLED_SERVER_ERROR: &str = "unhandled_server_error";

/// A packet's body: either of the two structural subtypes, or an opaque
/// payload for any other registered `packet_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// A request body.
    Request(Request),
    /// A response body.
    Response(Response),
    /// An opaque body for packet types the core does not interpret.
    Opaque(Vec<u8>),
}

impl Body {
    /// The request, if this body is a request.
    #[must_use]
    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Self::Request(r) => Some(r),
            _ => None,
        }
    }

    /// The response, if this body is a response.
    #[must_use]
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(r) => Some(r),
            _ => None,
        }
    }
}
