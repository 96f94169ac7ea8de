//! Connection state machine of the consumer

use serde::Serialize;

/// Lifecycle of the consumer's link to the broker
///
/// ```text
/// Disconnected ─► Connecting ─► Connected ─► Reconnecting ─► Connecting ─► ...
///                     │                          ▲
///                     └──── (attempt failed) ────┘
/// any state ─► ShuttingDown ─► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Initial state, no network resources held
    Disconnected,
    /// Connecting, declaring the queue and setting QoS
    Connecting,
    /// Receiving and acknowledging deliveries
    Connected,
    /// Waiting out a backoff delay after a failure
    Reconnecting,
    /// Shutdown requested, finishing in-flight work
    ShuttingDown,
    /// Channel and connection released
    Closed,
}

impl ConnectionState {
    /// Whether deliveries are currently flowing
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::ShuttingDown => write!(f, "shutting_down"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}
