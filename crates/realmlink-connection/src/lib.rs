//! Persistent connection management for Realmlink.
//!
//! One [`ConnectionManager`] owns one socket to the game world. It opens
//! the socket through a [`SocketTransport`](realmlink_transport::SocketTransport),
//! hands the open connection to a driver task, and reconnects with
//! exponential backoff when the connection drops unexpectedly.
//!
//! # Key types
//!
//! - [`ConnectionManager`]: connect, disconnect, send, subscribe
//! - [`ConnectionState`]: lifecycle state machine
//! - [`ConnectionEvent`]: what subscribers see
//! - [`ConnectionConfig`]: reconnect policy, timeouts, sub-protocol

mod config;
mod driver;
mod error;
mod manager;

pub use config::{ConnectionConfig, ConnectionEvent, ConnectionState};
pub use error::ConnectionError;
pub use manager::ConnectionManager;
