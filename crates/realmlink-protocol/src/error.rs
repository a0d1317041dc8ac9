//! Error types for the protocol layer.
//!
//! Each crate in Realmlink defines its own error enum. A `ProtocolError`
//! means a payload could not be turned into bytes or back, never that the
//! network failed.

use crate::{ErrorCategory, ErrorRecord, codes};

/// Errors that can occur while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, wrong types, or a
    /// truncated body.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload decoded but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl From<ProtocolError> for ErrorRecord {
    fn from(err: ProtocolError) -> Self {
        ErrorRecord::new(codes::MALFORMED_BODY, err.to_string(), ErrorCategory::Protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_becomes_protocol_record() {
        let record: ErrorRecord = ProtocolError::InvalidMessage("bad".into()).into();
        assert_eq!(record.category, ErrorCategory::Protocol);
        assert_eq!(record.code, codes::MALFORMED_BODY);
        assert!(record.message.contains("bad"));
        assert!(!record.is_retryable());
    }
}
