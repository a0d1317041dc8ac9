//! Unified error type for the Realmlink client.

use realmlink_connection::ConnectionError;
use realmlink_protocol::{ErrorRecord, ProtocolError};
use realmlink_session::StoreError;
use realmlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `realmlink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum RealmlinkError {
    /// A transport-level error (HTTP client, socket).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An auth operation failed.
    #[error(transparent)]
    Session(#[from] ErrorRecord),

    /// The saved-session store could not be opened or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A connection operation failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The configuration file is not valid TOML for [`ClientConfig`](crate::ClientConfig).
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Reading the configuration file failed.
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
}
