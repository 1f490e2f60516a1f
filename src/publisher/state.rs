//! Connection states of the tick publisher

use serde::Serialize;
use std::fmt;

/// Connection state of the publisher
///
/// Exactly one value is active per state machine. The machine starts in
/// [`ConnectionState::WaitingForNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Link is down; nothing to do until a network-up notification arrives
    #[default]
    WaitingForNetwork,
    /// Link established, no broker connection attempted yet
    NetworkUp,
    /// A connect attempt has been issued, awaiting ready or error
    ConnectionRequested,
    /// Broker session active; publishing permitted
    Connected,
}

impl ConnectionState {
    /// All states, in lifecycle order
    pub const ALL: [ConnectionState; 4] = [
        ConnectionState::WaitingForNetwork,
        ConnectionState::NetworkUp,
        ConnectionState::ConnectionRequested,
        ConnectionState::Connected,
    ];

    /// Stable snake_case name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::WaitingForNetwork => "waiting_for_network",
            ConnectionState::NetworkUp => "network_up",
            ConnectionState::ConnectionRequested => "connection_requested",
            ConnectionState::Connected => "connected",
        }
    }

    /// Whether a held client handle may be used for publishing
    pub fn can_publish(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether a client handle may legitimately be held in this state
    pub fn may_hold_handle(&self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectionRequested | ConnectionState::Connected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
