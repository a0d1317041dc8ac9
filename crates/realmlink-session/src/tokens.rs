//! Token storage: the current credentials in memory, the remembered
//! session on disk.
//!
//! Only the refresh token and the user identity ever reach the
//! [`KeyValueStore`]. The access token lives in memory and dies with the
//! process.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{KeyValueStore, StoreError};

/// Store section holding the remembered session.
pub const SAVE_SECTION: &str = "Auth";
/// Store key holding the remembered session.
pub const SAVE_KEY: &str = "Session";
/// Format version written into [`SavedSession::version`].
pub const SAVE_VERSION: u32 = 1;

/// Longest token lifetime honored. Longer server-issued lifetimes are
/// treated as this long.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

// ---------------------------------------------------------------------------
// TokenSet
// ---------------------------------------------------------------------------

/// An access/refresh token pair and when the access token stops working.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// `None` means the expiry is unknown, which counts as expired.
    pub expires_at: Option<Instant>,
}

impl TokenSet {
    /// Converts a relative lifetime into an absolute expiry from `now`.
    ///
    /// The lifetime is capped at [`MAX_TOKEN_LIFETIME`].
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Duration,
        now: Instant,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: now.checked_add(expires_in.min(MAX_TOKEN_LIFETIME)),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now >= at)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn redact(token: &str) -> &'static str {
    if token.is_empty() { "<empty>" } else { "<redacted>" }
}

// ---------------------------------------------------------------------------
// UserIdentity
// ---------------------------------------------------------------------------

/// Who is logged in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub username: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserIdentity {
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.email.is_empty() && self.username.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SavedSession
// ---------------------------------------------------------------------------

/// The single record written to the store when "remember me" is on.
///
/// Refresh token and identity are one value under one key, so a reader can
/// never see one without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub version: u32,
    pub remember_me: bool,
    pub refresh_token: String,
    pub user: UserIdentity,
    pub last_login: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Current {
    tokens: Option<TokenSet>,
    user: Option<UserIdentity>,
}

/// Current tokens and identity, plus persistence through a [`KeyValueStore`].
pub struct TokenStore<S> {
    store: S,
    current: Mutex<Current>,
}

impl<S: KeyValueStore> TokenStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            current: Mutex::new(Current::default()),
        }
    }

    /// Replaces tokens and identity together.
    pub fn set(&self, tokens: TokenSet, user: UserIdentity) {
        let mut current = self.current.lock();
        current.tokens = Some(tokens);
        current.user = Some(user);
    }

    /// Forgets tokens and identity. The persisted record is untouched.
    pub fn clear(&self) {
        *self.current.lock() = Current::default();
    }

    /// `true` when there is no token or `now` has reached its expiry.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.current
            .lock()
            .tokens
            .as_ref()
            .is_none_or(|t| t.is_expired(now))
    }

    pub fn tokens(&self) -> Option<TokenSet> {
        self.current.lock().tokens.clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.current.lock().user.clone()
    }

    /// The access token, or an empty string when logged out.
    pub fn access_token(&self) -> String {
        self.current
            .lock()
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .unwrap_or_default()
    }

    /// The refresh token, if one is held and non-empty.
    pub fn refresh_token(&self) -> Option<String> {
        self.current
            .lock()
            .tokens
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    /// Writes the remembered session, or an empty record when
    /// `remember_me` is off, then flushes.
    pub fn persist(&self, remember_me: bool) -> Result<(), StoreError> {
        let value = if remember_me {
            let (refresh_token, user) = {
                let current = self.current.lock();
                (
                    current
                        .tokens
                        .as_ref()
                        .map(|t| t.refresh_token.clone())
                        .unwrap_or_default(),
                    current.user.clone().unwrap_or_default(),
                )
            };
            serde_json::to_string(&SavedSession {
                version: SAVE_VERSION,
                remember_me,
                refresh_token,
                user,
                last_login: Some(Utc::now()),
            })?
        } else {
            String::new()
        };

        self.store.set(SAVE_SECTION, SAVE_KEY, &value)?;
        self.store.flush()
    }

    /// Writes an empty record and flushes.
    pub fn clear_persisted(&self) -> Result<(), StoreError> {
        self.persist(false)
    }

    /// Reads the remembered session. Absent, empty, unreadable, or
    /// token-less records all come back as `None`.
    pub fn load(&self) -> Option<SavedSession> {
        let raw = match self.store.get(SAVE_SECTION, SAVE_KEY) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read saved session");
                return None;
            }
        };

        let saved: SavedSession = match serde_json::from_str(&raw) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(error = %e, "saved session is unreadable, ignoring");
                return None;
            }
        };

        if saved.version != SAVE_VERSION {
            tracing::warn!(version = saved.version, "saved session has unknown version, ignoring");
            return None;
        }
        if saved.refresh_token.is_empty() {
            return None;
        }
        Some(saved)
    }
}
