use std::time::Duration;

use realmlink_protocol::{ErrorCategory, ErrorRecord, codes};

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request or URL could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Opening a connection (TCP, TLS, or the WebSocket handshake) failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// No response arrived within the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP client failed after the connection was made.
    #[error("http request failed: {0}")]
    Http(String),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

impl From<TransportError> for ErrorRecord {
    fn from(err: TransportError) -> Self {
        let code = match err {
            TransportError::Timeout(_) => codes::TIMEOUT,
            _ => codes::NO_RESPONSE,
        };
        ErrorRecord::new(code, err.to_string(), ErrorCategory::Network)
    }
}
