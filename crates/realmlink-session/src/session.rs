//! Session types: configuration, lifecycle state, inputs, and events.

use std::fmt;
use std::time::Duration;

use realmlink_protocol::ErrorRecord;
use serde::{Deserialize, Serialize};

use crate::{TokenSet, UserIdentity};

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Where the auth backend lives and how refresh is timed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Scheme, host, and port of the backend, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Sent as the `X-API-Version` header and used in endpoint paths.
    pub api_version: String,
    /// How long before expiry the scheduled refresh fires.
    pub refresh_margin: Duration,
    /// Lower bound on the scheduled refresh delay.
    pub min_refresh_delay: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_version: "v1".to_string(),
            refresh_margin: Duration::from_secs(60),
            min_refresh_delay: Duration::from_secs(1),
        }
    }
}

impl AuthConfig {
    /// Full URL of an auth endpoint: `{base}/api/{version}/auth/{name}`.
    pub fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/api/{}/auth/{name}",
            self.base_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Delay before refreshing a token that lives `expires_in`.
    pub fn refresh_delay(&self, expires_in: Duration) -> Duration {
        expires_in
            .saturating_sub(self.refresh_margin)
            .max(self.min_refresh_delay)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the auth session is in its lifecycle.
///
/// ```text
/// LoggedOut ──login──→ LoggingIn ──ok──→ LoggedIn ──refresh──→ RefreshingToken
///     ↑                    │ fail           ↑  │                    │    │
///     └────────────────────┘                │  └──logout──→ LoggedOut    │ fail → LoggedOut
///                                           └────────────── ok ──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    LoggedOut,
    LoggingIn,
    LoggedIn,
    RefreshingToken,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "LoggedOut"),
            Self::LoggingIn => write!(f, "LoggingIn"),
            Self::LoggedIn => write!(f, "LoggedIn"),
            Self::RefreshingToken => write!(f, "RefreshingToken"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Email and password for a login. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A new account.
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl Registration {
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// What a successful login (or auto-login) produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub user: UserIdentity,
    pub tokens: TokenSet,
}

/// Everything an [`AuthSession`](crate::AuthSession) announces.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    LoginSucceeded(LoginResult),
    LoginFailed(ErrorRecord),
    RegisterSucceeded(UserIdentity),
    RegisterFailed(ErrorRecord),
    /// Emitted on every logout, including one while already logged out.
    LogoutCompleted,
    /// Tokens were rotated by a refresh.
    TokenRefreshed(TokenSet),
    /// A refresh failed and the session was torn down.
    SessionTerminated(ErrorRecord),
}
