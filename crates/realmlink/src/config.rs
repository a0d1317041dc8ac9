//! Client configuration, loadable from TOML.
//!
//! Durations are plain seconds (fractions allowed) so a config file reads
//! naturally:
//!
//! ```toml
//! backend_url = "https://realm.example"
//! websocket_url = "wss://realm.example/ws"
//! max_reconnect_attempts = 5
//! reconnect_delay = 1.5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use realmlink_connection::ConnectionConfig;
use realmlink_session::AuthConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::RealmlinkError;

/// Filter used by [`logging::init`](crate::logging::init) unless
/// `RUST_LOG` or [`ClientConfig::log_filter`] says otherwise.
pub const DEFAULT_LOG_FILTER: &str = "realmlink=info";

/// Where the remembered session is kept when no `save_path` is set.
pub const DEFAULT_SAVE_FILE: &str = "realmlink_session.json";

const MAX_RECONNECT_ATTEMPTS: u32 = 10;
const RECONNECT_DELAY_RANGE: (f64, f64) = (0.1, 30.0);
const CONNECT_TIMEOUT_RANGE: (f64, f64) = (1.0, 60.0);
const REQUEST_TIMEOUT_RANGE: (f64, f64) = (1.0, 60.0);

/// Everything a [`GameClient`](crate::GameClient) needs to know.
///
/// Missing keys take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme, host, and port of the auth backend.
    pub backend_url: String,
    pub api_version: String,
    pub websocket_url: String,
    /// Sub-protocol requested when opening the world socket.
    pub websocket_protocol: Option<String>,
    /// Seconds before an HTTP request gives up.
    pub request_timeout: f64,
    /// Seconds before a socket open gives up.
    pub connect_timeout: f64,
    pub max_reconnect_attempts: u32,
    /// Seconds before the first reconnect attempt.
    pub reconnect_delay: f64,
    /// Seconds before token expiry that the refresh fires.
    pub refresh_margin: f64,
    pub log_filter: String,
    /// File for the remembered session. Defaults to [`DEFAULT_SAVE_FILE`].
    pub save_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            api_version: "v1".to_string(),
            websocket_url: "ws://localhost:8080/ws".to_string(),
            websocket_protocol: None,
            request_timeout: 10.0,
            connect_timeout: 10.0,
            max_reconnect_attempts: 3,
            reconnect_delay: 2.0,
            refresh_margin: 60.0,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            save_path: None,
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, RealmlinkError> {
        let config: Self = toml::from_str(text)?;
        Ok(config.validated())
    }

    /// Reads, parses, and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RealmlinkError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Clamps out-of-range values, logging each correction.
    ///
    /// - `max_reconnect_attempts`: 0 to 10
    /// - `reconnect_delay`: 0.1 to 30 seconds
    /// - `connect_timeout` and `request_timeout`: 1 to 60 seconds
    /// - `refresh_margin`: not negative
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.max_reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            warn!(
                value = self.max_reconnect_attempts,
                max = MAX_RECONNECT_ATTEMPTS,
                "max_reconnect_attempts out of range, clamping"
            );
            self.max_reconnect_attempts = MAX_RECONNECT_ATTEMPTS;
        }
        self.reconnect_delay = clamp_secs(
            "reconnect_delay",
            self.reconnect_delay,
            RECONNECT_DELAY_RANGE,
            defaults.reconnect_delay,
        );
        self.connect_timeout = clamp_secs(
            "connect_timeout",
            self.connect_timeout,
            CONNECT_TIMEOUT_RANGE,
            defaults.connect_timeout,
        );
        self.request_timeout = clamp_secs(
            "request_timeout",
            self.request_timeout,
            REQUEST_TIMEOUT_RANGE,
            defaults.request_timeout,
        );
        self.refresh_margin = clamp_secs(
            "refresh_margin",
            self.refresh_margin,
            (0.0, f64::MAX),
            defaults.refresh_margin,
        );
        self
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            base_url: self.backend_url.clone(),
            api_version: self.api_version.clone(),
            refresh_margin: Duration::from_secs_f64(self.refresh_margin),
            ..AuthConfig::default()
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_delay: Duration::from_secs_f64(self.reconnect_delay),
            connect_timeout: Duration::from_secs_f64(self.connect_timeout),
            protocol: self.websocket_protocol.clone(),
            ..ConnectionConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout)
    }

    pub fn save_path(&self) -> PathBuf {
        self.save_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_FILE))
    }
}

fn clamp_secs(name: &str, value: f64, (min, max): (f64, f64), fallback: f64) -> f64 {
    if !value.is_finite() {
        warn!(field = name, fallback, "value is not a number, using default");
        return fallback;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(field = name, value, clamped, "value out of range, clamping");
    }
    clamped
}
