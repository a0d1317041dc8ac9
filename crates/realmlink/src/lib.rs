//! # Realmlink
//!
//! Client-side network session core for online games.
//!
//! Realmlink keeps a player signed in and connected: it logs in against an
//! HTTP auth backend, remembers and refreshes tokens, and holds a
//! persistent world socket that reconnects with backoff when it drops.
//! Every failure along the way becomes a classified [`ErrorRecord`] in one
//! shared history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realmlink::prelude::*;
//!
//! # async fn run() -> Result<(), RealmlinkError> {
//! let config = ClientConfig::load("realmlink.toml")?;
//! realmlink::logging::init(&config.log_filter);
//!
//! let client = GameClient::production(config)?;
//! if client.try_auto_login().await.is_err() {
//!     client.login(Credentials::new("me@realm.example", "secret")).await?;
//! }
//! client.connect_world().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod logging;

pub use client::{GameClient, GameClientBuilder, LOGOUT_REASON};
pub use config::{ClientConfig, DEFAULT_LOG_FILTER, DEFAULT_SAVE_FILE};
pub use error::RealmlinkError;

// Re-export sub-crates for advanced usage
pub use realmlink_connection as connection;
pub use realmlink_protocol as protocol;
pub use realmlink_retry as retry;
pub use realmlink_session as session;
pub use realmlink_transport as transport;

pub use realmlink_protocol::ErrorRecord;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::{ClientConfig, GameClient, GameClientBuilder, RealmlinkError};
    pub use realmlink_connection::{ConnectionEvent, ConnectionState};
    pub use realmlink_protocol::{ErrorCategory, ErrorRecord, ErrorReporter, ErrorSeverity};
    pub use realmlink_session::{
        AuthEvent, Credentials, LoginResult, Registration, SessionState, UserIdentity,
    };
}
