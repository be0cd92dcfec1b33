//! Connection lifecycle state machine.
//!
//! States progress monotonically: `Created → Connecting → Handshaking →
//! Connected → Closed`, with `Closed` absorbing. Transitions go through a
//! single [`StateMachine::transition`] entry point that compares-and-updates
//! the current state and fans the change out to observers, the way the
//! teacher's connection state machine drives its own transitions through one
//! method rather than letting callers poke at a raw field.

use tokio::sync::watch;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Constructed, no I/O started.
    Created,
    /// Dialer: resolving/connecting. Listener-origin connections skip this
    /// state (the socket is already open).
    Connecting,
    /// Read loop started; handshake request/response pair in flight.
    Handshaking,
    /// Handshake complete; ordinary traffic flows.
    Connected,
    /// Terminal. Resources released, correlator drained.
    Closed,
}

impl ConnectionState {
    /// Whether `next` is a legal transition from `self`.
    ///
    /// Every state can transition to `Closed`; otherwise only the next state
    /// in the sequence is legal. There are no backward transitions.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == Self::Closed {
            return false;
        }
        if next == Self::Closed {
            return true;
        }
        matches!(
            (self, next),
            (Self::Created, Self::Connecting)
                | (Self::Created, Self::Handshaking)
                | (Self::Connecting, Self::Handshaking)
                | (Self::Handshaking, Self::Connected)
        )
    }
}

/// Observable, monotonic connection state holder.
///
/// Wraps a [`watch`] channel: `transition` performs the compare-and-update
/// and observers subscribe with [`StateMachine::subscribe`]. Observer
/// notification never blocks the transition — `watch::Sender::send` does
/// not wait for receivers to catch up.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ConnectionState>,
}

impl StateMachine {
    /// Start a new state machine in [`ConnectionState::Created`].
    #[must_use]
    pub fn new() -> Self {
        Self { tx: watch::Sender::new(ConnectionState::Created) }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes. The receiver immediately observes the
    /// current state, then every subsequent transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Atomically move to `next` if legal from the current state.
    ///
    /// Returns `true` if the transition was applied, `false` if `next` was
    /// not reachable from the current state (a no-op, not an error — e.g.
    /// racing close calls).
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                applied = true;
                true
            } else {
                false
            }
        });
        applied
    }

    /// Shorthand for `transition(ConnectionState::Closed)`.
    pub fn close(&self) -> bool {
        self.transition(ConnectionState::Closed)
    }

    /// Whether the machine has reached the terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.current() == ConnectionState::Closed
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_progress_monotonically() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), ConnectionState::Created);
        assert!(sm.transition(ConnectionState::Connecting));
        assert!(sm.transition(ConnectionState::Handshaking));
        assert!(sm.transition(ConnectionState::Connected));
        assert!(sm.transition(ConnectionState::Closed));
        assert_eq!(sm.current(), ConnectionState::Closed);
    }

    #[test]
    fn listener_origin_can_skip_connecting() {
        let sm = StateMachine::new();
        assert!(sm.transition(ConnectionState::Handshaking));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let sm = StateMachine::new();
        assert!(sm.transition(ConnectionState::Connecting));
        assert!(sm.transition(ConnectionState::Handshaking));
        assert!(!sm.transition(ConnectionState::Connecting));
        assert_eq!(sm.current(), ConnectionState::Handshaking);
    }

    #[test]
    fn closed_is_absorbing() {
        let sm = StateMachine::new();
        assert!(sm.close());
        assert!(!sm.transition(ConnectionState::Connecting));
        assert!(sm.is_closed());
    }

    #[test]
    fn any_state_can_close() {
        for start in [
            ConnectionState::Created,
            ConnectionState::Connecting,
            ConnectionState::Handshaking,
            ConnectionState::Connected,
        ] {
            let sm = StateMachine::new();
            // Walk to `start` via legal transitions, then verify close works.
            match start {
                ConnectionState::Created => {},
                ConnectionState::Connecting => assert!(sm.transition(ConnectionState::Connecting)),
                ConnectionState::Handshaking => assert!(sm.transition(ConnectionState::Handshaking)),
                ConnectionState::Connected => {
                    assert!(sm.transition(ConnectionState::Handshaking));
                    assert!(sm.transition(ConnectionState::Connected));
                },
                ConnectionState::Closed => unreachable!(),
            }
            assert!(sm.close());
        }
    }

    #[tokio::test]
    async fn observers_see_transitions() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();
        assert_eq!(*rx.borrow(), ConnectionState::Created);
        sm.transition(ConnectionState::Connecting);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
    }
}
