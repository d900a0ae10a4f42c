//! Connection state machine for ressync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! connection lifecycle of a connection-based backend. The state machine
//! takes events as input and produces a new state plus a list of actions
//! to execute.
//!
//! Open and close are signalled by the transport; the machine never
//! initiates a connection on its own except when the reconnect timer fires.
//! At most one reconnect timer is ever outstanding: a close while one is
//! pending produces no new timer.
//!
//! The actual I/O (connecting, flushing, timers) is performed by
//! sync-client, not by this module.

use std::time::Duration;

/// Default fixed reconnect backoff.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, no reconnect pending.
    Disconnected,
    /// Transport reported the connection open.
    Connected,
    /// Not connected, a reconnect timer is outstanding.
    Reconnecting,
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event, backoff: &Backoff) -> (Self, Vec<Action>) {
        match (self, event) {
            // Opened from anywhere
            (Self::Reconnecting, Event::Opened) => {
                (Self::Connected, vec![Action::CancelReconnect, Action::Flush])
            }
            (_, Event::Opened) => (Self::Connected, vec![Action::Flush]),

            // Closed
            (Self::Connected | Self::Disconnected, Event::Closed) => (
                Self::Reconnecting,
                vec![Action::StartReconnectTimer {
                    delay: backoff.delay(),
                }],
            ),
            (Self::Reconnecting, Event::Closed) => (Self::Reconnecting, vec![]),

            // Timer fired
            (Self::Reconnecting, Event::ReconnectTimer) => {
                (Self::Disconnected, vec![Action::Connect])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a reconnect timer is outstanding.
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Transport reported the connection open.
    Opened,
    /// Transport reported the connection closed.
    Closed,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Initiate a transport connection.
    Connect,
    /// Deliver everything in the outgoing queue.
    Flush,
    /// Start a timer for reconnection.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
}

/// Fixed reconnection backoff.
///
/// Every reconnect waits the same delay; there is no growth and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    delay: Duration,
}

impl Backoff {
    /// Backoff with a fixed delay.
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before the next reconnect attempt.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::default()
    }

    #[test]
    fn starts_disconnected() {
        let state = ConnectionState::new();
        assert!(matches!(state, ConnectionState::Disconnected));
        assert!(!state.is_connected());
    }

    #[test]
    fn opened_transitions_to_connected_and_flushes() {
        let state = ConnectionState::Disconnected;
        let (new_state, actions) = state.on_event(Event::Opened, &backoff());

        assert!(new_state.is_connected());
        assert_eq!(actions, vec![Action::Flush]);
    }

    #[test]
    fn closed_starts_one_timer() {
        let state = ConnectionState::Connected;
        let (new_state, actions) = state.on_event(Event::Closed, &backoff());

        assert!(new_state.is_reconnecting());
        assert_eq!(
            actions,
            vec![Action::StartReconnectTimer {
                delay: DEFAULT_RECONNECT_TIMEOUT
            }]
        );
    }

    #[test]
    fn second_close_does_not_start_another_timer() {
        let (state, _) = ConnectionState::Connected.on_event(Event::Closed, &backoff());
        let (state, actions) = state.on_event(Event::Closed, &backoff());

        assert!(state.is_reconnecting());
        assert!(actions.is_empty());
    }

    #[test]
    fn close_while_disconnected_starts_timer() {
        // A failed connect attempt reports a close without ever opening.
        let state = ConnectionState::Disconnected;
        let (new_state, actions) = state.on_event(Event::Closed, &backoff());

        assert!(new_state.is_reconnecting());
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartReconnectTimer { .. })));
    }

    #[test]
    fn opened_while_reconnecting_cancels_timer() {
        let state = ConnectionState::Reconnecting;
        let (new_state, actions) = state.on_event(Event::Opened, &backoff());

        assert!(new_state.is_connected());
        assert_eq!(actions, vec![Action::CancelReconnect, Action::Flush]);
    }

    #[test]
    fn timer_fires_connect() {
        let state = ConnectionState::Reconnecting;
        let (new_state, actions) = state.on_event(Event::ReconnectTimer, &backoff());

        assert!(matches!(new_state, ConnectionState::Disconnected));
        assert_eq!(actions, vec![Action::Connect]);
    }

    #[test]
    fn stale_timer_after_open_is_ignored() {
        let state = ConnectionState::Connected;
        let (new_state, actions) = state.on_event(Event::ReconnectTimer, &backoff());

        assert!(new_state.is_connected());
        assert!(actions.is_empty());
    }

    #[test]
    fn timer_uses_configured_delay() {
        let backoff = Backoff::fixed(Duration::from_millis(250));
        let (_, actions) = ConnectionState::Connected.on_event(Event::Closed, &backoff);

        assert_eq!(
            actions,
            vec![Action::StartReconnectTimer {
                delay: Duration::from_millis(250)
            }]
        );
    }

    #[test]
    fn full_reconnect_flow() {
        let b = backoff();
        let state = ConnectionState::Connected;

        let (state, _) = state.on_event(Event::Closed, &b);
        assert!(state.is_reconnecting());

        let (state, actions) = state.on_event(Event::ReconnectTimer, &b);
        assert_eq!(actions, vec![Action::Connect]);

        let (state, actions) = state.on_event(Event::Opened, &b);
        assert!(state.is_connected());
        assert_eq!(actions, vec![Action::Flush]);
    }
}
