//! VPN connection state management
//!
//! Defines the connection states and the session record the monitor keeps
//! between polls. The session owns the invariants tying the start time and
//! reconnect counter to the current state.

use serde::Serialize;
use tokio::time::Instant;

/// VPN connection states
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,

    /// Service start issued, waiting for the tunnel
    Connecting,

    /// Service active and tunnel interface present
    Connected,

    /// Service stop issued
    Disconnecting,

    /// Status could not be determined or a command failed
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Mutable record the connection monitor keeps for its lifetime
///
/// `connected_since` is `Some` exactly when `current` is `Connected`; every
/// state change goes through [`MonitorSession::set_state`] to keep it so.
#[derive(Debug, Clone)]
pub struct MonitorSession {
    current: ConnectionState,
    last_observed: ConnectionState,
    connected_since: Option<Instant>,
    reconnect_attempts: u32,
    max_reconnect_attempts: u32,
}

impl MonitorSession {
    /// Create a disconnected session allowing `max_reconnect_attempts` retries per drop
    pub fn new(max_reconnect_attempts: u32) -> Self {
        Self {
            current: ConnectionState::Disconnected,
            last_observed: ConnectionState::Disconnected,
            connected_since: None,
            reconnect_attempts: 0,
            max_reconnect_attempts,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Status seen by the previous poll
    pub fn last_observed(&self) -> ConnectionState {
        self.last_observed
    }

    pub fn connected_since(&self) -> Option<Instant> {
        self.connected_since
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    /// Move to `state`, starting the connection clock on entry to
    /// `Connected` and clearing it on any other state
    pub fn set_state(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                if self.current != ConnectionState::Connected || self.connected_since.is_none() {
                    self.connected_since = Some(Instant::now());
                }
            }
            _ => self.connected_since = None,
        }
        self.current = state;
    }

    /// Record the status of the latest poll
    pub fn observe(&mut self, state: ConnectionState) {
        self.last_observed = state;
    }

    /// Record a successful connect: restart the clock and clear the retry budget
    pub fn mark_connected(&mut self) {
        self.current = ConnectionState::Connected;
        self.connected_since = Some(Instant::now());
        self.reconnect_attempts = 0;
    }

    /// Consume one reconnect attempt if any remain
    ///
    /// Returns the attempt number, or `None` once the budget is spent.
    pub fn try_take_reconnect_attempt(&mut self) -> Option<u32> {
        if self.reconnect_attempts < self.max_reconnect_attempts {
            self.reconnect_attempts += 1;
            Some(self.reconnect_attempts)
        } else {
            None
        }
    }

    /// Whole seconds since the connection was confirmed, while connected
    pub fn connection_duration(&self) -> Option<u64> {
        if self.current != ConnectionState::Connected {
            return None;
        }
        self.connected_since.map(|since| since.elapsed().as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ConnectionState::Disconnected), "disconnected");
        assert_eq!(format!("{}", ConnectionState::Connecting), "connecting");
        assert_eq!(format!("{}", ConnectionState::Connected), "connected");
        assert_eq!(format!("{}", ConnectionState::Disconnecting), "disconnecting");
        assert_eq!(format!("{}", ConnectionState::Error), "error");
    }

    #[test]
    fn test_serialize_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
    }

    #[tokio::test]
    async fn test_start_time_follows_connected_state() {
        let mut session = MonitorSession::new(3);
        assert!(session.connected_since().is_none());

        session.set_state(ConnectionState::Connected);
        let since = session.connected_since();
        assert!(since.is_some());

        // Staying connected keeps the original start time
        session.set_state(ConnectionState::Connected);
        assert_eq!(session.connected_since(), since);

        for state in [
            ConnectionState::Connecting,
            ConnectionState::Disconnecting,
            ConnectionState::Error,
            ConnectionState::Disconnected,
        ] {
            session.set_state(ConnectionState::Connected);
            session.set_state(state);
            assert!(session.connected_since().is_none(), "{} kept a start time", state);
            assert!(session.connection_duration().is_none());
        }
    }

    #[test]
    fn test_reconnect_budget() {
        let mut session = MonitorSession::new(3);
        assert_eq!(session.try_take_reconnect_attempt(), Some(1));
        assert_eq!(session.try_take_reconnect_attempt(), Some(2));
        assert_eq!(session.try_take_reconnect_attempt(), Some(3));
        assert_eq!(session.try_take_reconnect_attempt(), None);
        assert_eq!(session.reconnect_attempts(), 3);

        session.mark_connected();
        assert_eq!(session.reconnect_attempts(), 0);
        assert_eq!(session.current(), ConnectionState::Connected);
        assert!(session.connected_since().is_some());
    }
}
