//! Connection configuration, state machine, and events.

use std::time::Duration;

use realmlink_retry::RetryPolicy;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Settings for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Reconnect attempts after an unexpected drop. 0 disables reconnection.
    pub max_reconnect_attempts: u32,

    /// Wait before the first reconnect attempt. Doubles for each later one.
    pub reconnect_delay: Duration,

    /// Cap on any single reconnect wait.
    pub max_reconnect_delay: Duration,

    /// Random extra delay (0..=jitter) added to each reconnect wait.
    pub reconnect_jitter: Duration,

    /// How long an open may take before it counts as failed.
    pub connect_timeout: Duration,

    /// How long to wait for the peer to acknowledge a close.
    pub close_timeout: Duration,

    /// Sub-protocol requested during the handshake.
    pub protocol: Option<String>,

    /// Buffer of the event broadcast channel. Slow subscribers that fall
    /// further behind than this skip events.
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_delay: Duration::from_secs(60),
            reconnect_jitter: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            protocol: None,
            event_capacity: 256,
        }
    }
}

impl ConnectionConfig {
    /// The backoff policy for reconnection: doubling from
    /// `reconnect_delay`, at most `max_reconnect_attempts` tries.
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_reconnect_attempts.max(1),
            initial_delay: self.reconnect_delay,
            max_delay: self.max_reconnect_delay,
            backoff_multiplier: 2.0,
            exponential: true,
            jitter: self.reconnect_jitter,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle state of the connection.
///
/// ```text
/// Disconnected ──connect──→ Connecting ──open──→ Connected
///      ↑                        │                    │
///      ├──────── fail ──────────┘                    │ disconnect
///      │                                             ↓
///      └──────────── closed ─────────────────── Closing
/// ```
///
/// A drop while Connected goes straight back to Disconnected, and may arm
/// a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionEvent
// ---------------------------------------------------------------------------

/// Everything a [`ConnectionManager`](crate::ConnectionManager) announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    /// An open failed or the connection broke without a close frame.
    ConnectionError(String),
    Closed {
        code: u16,
        reason: String,
    },
    MessageReceived(String),
    BinaryMessageReceived(Vec<u8>),
    /// Every reconnect attempt failed. Nothing further is scheduled.
    ReconnectFailed {
        attempts: u32,
    },
}
