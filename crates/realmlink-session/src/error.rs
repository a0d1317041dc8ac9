//! Error types for the session layer.
//!
//! Auth failures themselves are [`ErrorRecord`]s, the same datum every
//! layer reports. The only Rust error enum here covers the persistence
//! collaborator.

use realmlink_protocol::{ErrorCategory, ErrorRecord, codes};

/// Errors from a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but is not a valid store.
    #[error("store is corrupt: {0}")]
    Corrupt(String),

    /// A value could not be serialized.
    #[error("store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<StoreError> for ErrorRecord {
    fn from(err: StoreError) -> Self {
        ErrorRecord::new(codes::PERSISTENCE_FAILED, err.to_string(), ErrorCategory::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realmlink_protocol::ErrorSeverity;

    #[test]
    fn test_store_error_becomes_critical_system_record() {
        let err = StoreError::Corrupt("truncated".into());
        let record: ErrorRecord = err.into();
        assert_eq!(record.code, codes::PERSISTENCE_FAILED);
        assert_eq!(record.category, ErrorCategory::System);
        assert_eq!(record.severity, ErrorSeverity::Critical);
        assert!(record.message.contains("truncated"));
    }
}
