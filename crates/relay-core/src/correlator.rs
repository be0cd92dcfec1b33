//! Request correlator: matches inbound responses to outstanding requests by
//! `request_id`, independent of delivery order.
//!
//! `pending` is the only piece of a connection's state that needs its own
//! lock distinct from the state machine's `watch` channel: both the read
//! loop (resolving responses) and caller tasks (registering new waiters,
//! timing out) touch it concurrently.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use relay_proto::Response;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::CorrelatorError;

/// Default timeout for an outstanding request, per §5 of the spec.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Outstanding-request map plus the per-connection `request_id` counter.
///
/// For every `request_id` registered, exactly one of {response delivered,
/// timeout, connection close} eventually removes it — enforced by
/// `resolve`/`fail_one`/`fail_all` all consuming the waiter out of the map
/// before completing it.
#[derive(Debug)]
pub struct Correlator {
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl Correlator {
    /// Build a correlator with the given default request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { pending: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1), timeout }
    }

    /// This connection's default request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Assign a fresh, monotonically increasing `request_id`.
    #[must_use]
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a waiter for `request_id`, returning the receiving half.
    ///
    /// Callers must await the receiver with a timeout (see
    /// [`Correlator::timeout`]) and call [`Correlator::fail_one`] on
    /// elapse, since the correlator itself does not schedule timeouts.
    pub fn register(&self, request_id: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(request_id, tx);
        rx
    }

    /// Resolve an inbound response against its waiter, if one is still
    /// outstanding.
    ///
    /// A response for an id with no (or no longer) outstanding waiter —
    /// because it already timed out, or this is a duplicate delivery — is
    /// logged and discarded, per the spec's duplicate-response handling.
    pub fn resolve(&self, response: Response) {
        let request_id = response.request_id;
        let waiter = {
            let mut guard = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.remove(&request_id)
        };
        match waiter {
            Some(tx) => {
                // The receiver may have been dropped (e.g. the caller gave
                // up after a timeout raced the response); that's not an
                // error, just nothing left to wake.
                let _ = tx.send(response);
            },
            None => {
                warn!(request_id, "discarding response with no outstanding waiter");
            },
        }
    }

    /// Remove and drop the waiter for `request_id` without resolving it
    /// (used on local timeout, so a later-arriving response is discarded).
    pub fn forget(&self, request_id: u64) {
        let mut guard = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.remove(&request_id);
    }

    /// Fail every outstanding waiter, e.g. on connection close. Draining the
    /// map (rather than leaving entries for a caller to discover closed)
    /// drops each `oneshot::Sender`, which completes the corresponding
    /// receiver with `RecvError` — callers translate that to
    /// [`CorrelatorError::Disconnected`].
    pub fn fail_all(&self) {
        let mut guard = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.clear();
    }

    /// Number of requests currently outstanding. Exposed for tests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// Await `rx` against the correlator's timeout, translating outcomes into
/// [`CorrelatorError`] and cleaning up the map entry on timeout.
///
/// # Errors
///
/// Returns [`CorrelatorError::RequestTimeout`] if no response arrives within
/// `timeout`, or [`CorrelatorError::Disconnected`] if the waiter was dropped
/// (connection closed) before a response arrived.
pub async fn await_response(
    correlator: &Correlator,
    request_id: u64,
    rx: oneshot::Receiver<Response>,
) -> Result<Response, CorrelatorError> {
    match tokio::time::timeout(correlator.timeout(), rx).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_recv_error)) => Err(CorrelatorError::Disconnected),
        Err(_elapsed) => {
            correlator.forget(request_id);
            Err(CorrelatorError::RequestTimeout)
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn request_ids_are_monotonic() {
        let correlator = Correlator::default();
        let a = correlator.next_request_id();
        let b = correlator.next_request_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn resolve_wakes_the_matching_waiter() {
        let correlator = Correlator::default();
        let id = correlator.next_request_id();
        let rx = correlator.register(id);
        correlator.resolve(Response::ok(id));
        let response = rx.await.expect("resolved");
        assert_eq!(response.request_id, id);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn duplicate_response_is_discarded() {
        let correlator = Correlator::default();
        let id = correlator.next_request_id();
        let _rx = correlator.register(id);
        correlator.resolve(Response::ok(id));
        // Second resolve for the same id: no waiter left, must not panic.
        correlator.resolve(Response::ok(id));
    }

    #[tokio::test]
    async fn close_fails_every_pending_waiter() {
        let correlator = Correlator::default();
        let id_a = correlator.next_request_id();
        let id_b = correlator.next_request_id();
        let rx_a = correlator.register(id_a);
        let rx_b = correlator.register(id_b);

        correlator.fail_all();

        assert!(rx_a.await.is_err());
        assert!(rx_b.await.is_err());
    }

    #[tokio::test]
    async fn timeout_removes_the_entry_and_discards_late_response() {
        let correlator = Correlator::new(Duration::from_millis(10));
        let id = correlator.next_request_id();
        let rx = correlator.register(id);

        let result = await_response(&correlator, id, rx).await;
        assert!(matches!(result, Err(CorrelatorError::RequestTimeout)));
        assert_eq!(correlator.pending_count(), 0);

        // A response that arrives after the timeout is just a discarded
        // duplicate from the correlator's point of view.
        correlator.resolve(Response::ok(id));
    }
}
