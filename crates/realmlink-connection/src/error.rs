//! Error types for the connection layer.

use std::time::Duration;

use realmlink_protocol::{ErrorCategory, ErrorRecord, codes};
use realmlink_transport::TransportError;

use crate::ConnectionState;

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The operation is not valid in the current state, e.g. `connect`
    /// while already connected.
    #[error("operation not valid while {0}")]
    InvalidState(ConnectionState),

    /// The transport could not open the connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Opening took longer than the configured connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The attempt was overtaken by a disconnect or a newer attempt.
    #[error("connection attempt aborted")]
    Aborted,
}

impl From<&ConnectionError> for ErrorRecord {
    fn from(err: &ConnectionError) -> Self {
        let code = match err {
            ConnectionError::Timeout(_) => codes::TIMEOUT,
            _ => codes::SOCKET_ERROR,
        };
        ErrorRecord::new(code, err.to_string(), ErrorCategory::Network)
    }
}

impl From<ConnectionError> for ErrorRecord {
    fn from(err: ConnectionError) -> Self {
        ErrorRecord::from(&err)
    }
}
