//! Authentication session management for Realmlink.
//!
//! This crate owns everything about *who* the player is:
//!
//! 1. **Auth flow**: login, registration, logout, and token refresh
//!    against the backend ([`AuthSession`])
//! 2. **Token storage**: the live token pair in memory, the remembered
//!    session on disk ([`TokenStore`], [`KeyValueStore`])
//! 3. **Offline backend**: [`MockAuthBackend`], an in-memory stand-in for
//!    the auth server
//!
//! # How it fits in the stack
//!
//! ```text
//! GameClient (above)  ← pushes the access token into the connection layer
//!     ↕
//! Session Layer (this crate)  ← login state, tokens, scheduled refresh
//!     ↕
//! Transport + Retry (below)  ← HTTP requests, single-shot refresh timer
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod mock;
mod session;
mod store;
mod tokens;
mod validate;

pub use auth::AuthSession;
pub use error::StoreError;
pub use mock::{DEFAULT_TOKEN_LIFETIME_SECS, MockAuthBackend};
pub use session::{AuthConfig, AuthEvent, Credentials, LoginResult, Registration, SessionState};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use tokens::{MAX_TOKEN_LIFETIME, SAVE_KEY, SAVE_SECTION, SAVE_VERSION, SavedSession, TokenSet, TokenStore, UserIdentity};
pub use validate::{is_valid_email, is_valid_username};
