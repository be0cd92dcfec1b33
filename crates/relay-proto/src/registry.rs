//! Process-wide packet type registry.
//!
//! Maps a `packet_type` tag to the body schema a packet of that type
//! carries. Registration happens once, during module initialization, and is
//! append-only: re-registering a tag is a programmer error, not a runtime
//! condition callers are expected to recover from.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Built-in tag for [`crate::body::Body::Request`].
pub const PACKET_TYPE_REQUEST: u8 = 0x01;
/// Built-in tag for [`crate::body::Body::Response`].
pub const PACKET_TYPE_RESPONSE: u8 = 0x02;

/// What schema a registered `packet_type` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Decodes to [`crate::body::Body::Request`].
    Request,
    /// Decodes to [`crate::body::Body::Response`].
    Response,
    /// Decodes to [`crate::body::Body::Opaque`]; the caller interprets the
    /// bytes.
    Opaque,
}

fn registry() -> &'static RwLock<HashMap<u8, BodyKind>> {
    static REGISTRY: OnceLock<RwLock<HashMap<u8, BodyKind>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert(PACKET_TYPE_REQUEST, BodyKind::Request);
        map.insert(PACKET_TYPE_RESPONSE, BodyKind::Response);
        RwLock::new(map)
    })
}

/// Register `packet_type` as carrying bodies of `kind`.
///
/// # Panics
///
/// Panics if `packet_type` is already registered. This is an invariant
/// violation at initialization time (a programmer error, per the protocol's
/// design), not a condition a caller can recover from at runtime.
#[allow(clippy::panic)]
pub fn register(packet_type: u8, kind: BodyKind) {
    let mut guard = registry().write().unwrap_or_else(std::sync::PoisonError::into_inner);
    if guard.contains_key(&packet_type) {
        panic!("invariant: packet type {packet_type:#04x} registered twice");
    }
    guard.insert(packet_type, kind);
}

/// Look up the body kind registered for `packet_type`, if any.
#[must_use]
pub fn lookup(packet_type: u8) -> Option<BodyKind> {
    registry().read().unwrap_or_else(std::sync::PoisonError::into_inner).get(&packet_type).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_types_are_preregistered() {
        assert_eq!(lookup(PACKET_TYPE_REQUEST), Some(BodyKind::Request));
        assert_eq!(lookup(PACKET_TYPE_RESPONSE), Some(BodyKind::Response));
    }

    #[test]
    fn unknown_type_is_unregistered() {
        assert_eq!(lookup(0xEF), None);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        register(0x10, BodyKind::Opaque);
        register(0x10, BodyKind::Opaque);
    }
}
