//! Process-wide and per-session surfaces for non-propagatable errors.
//!
//! Background tasks — fire-and-forget response sends, dispatched handler
//! callbacks, event invocations — cannot propagate a `Result` to anyone.
//! An [`ErrorSignal`] gives them somewhere to report instead of silently
//! swallowing the failure. The default subscriber logs via `tracing`; tests
//! install their own to assert on background failures.

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::error;

/// A background failure, tagged with the component that observed it.
#[derive(Debug, Clone)]
pub struct SignaledError {
    /// Where the failure was observed (e.g. `"dispatch"`, `"reconnect"`).
    pub source: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for SignaledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}

/// A subscriber for background failures.
pub trait ErrorSubscriber: Send + Sync {
    /// Handle one signaled error. Must not block or panic.
    fn on_error(&self, error: &SignaledError);
}

/// Logs every signaled error at `error` level. The default subscriber for
/// both the process-global signal and any session that does not install its
/// own.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSubscriber;

impl ErrorSubscriber for LoggingSubscriber {
    fn on_error(&self, error: &SignaledError) {
        error!(source = error.source, message = %error.message, "background error");
    }
}

/// Observable sink for background/non-propagatable errors.
///
/// Cheap to clone (an `Arc` around a swappable subscriber); every session
/// gets its own `ErrorSignal` at construction, defaulting to
/// [`LoggingSubscriber`], and detached tasks with no session context fall
/// back to [`global`].
#[derive(Clone)]
pub struct ErrorSignal {
    subscriber: Arc<RwLock<Arc<dyn ErrorSubscriber>>>,
}

impl ErrorSignal {
    /// Build a signal with the default logging subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self { subscriber: Arc::new(RwLock::new(Arc::new(LoggingSubscriber))) }
    }

    /// Replace the subscriber. Tests use this to capture signaled errors
    /// instead of logging them.
    pub fn set_subscriber(&self, subscriber: Arc<dyn ErrorSubscriber>) {
        *self.subscriber.write().unwrap_or_else(std::sync::PoisonError::into_inner) = subscriber;
    }

    /// Report a background failure from `source`.
    pub fn signal(&self, source: &'static str, message: impl Into<String>) {
        let error = SignaledError { source, message: message.into() };
        let subscriber = self.subscriber.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        subscriber.on_error(&error);
    }
}

impl Default for ErrorSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-global signal, used by detached tasks with no owning session
/// (e.g. a dispatch task spawned from the read loop after the session that
/// started it has already been dropped).
pub fn global() -> &'static ErrorSignal {
    static GLOBAL: OnceLock<ErrorSignal> = OnceLock::new();
    GLOBAL.get_or_init(ErrorSignal::new)
}
