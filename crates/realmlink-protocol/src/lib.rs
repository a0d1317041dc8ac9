//! Error taxonomy and wire payloads for Realmlink.
//!
//! This crate is the leaf of the workspace. Everything above it speaks in
//! its terms:
//!
//! - **Error taxonomy** ([`ErrorRecord`], [`ErrorCategory`],
//!   [`ErrorSeverity`], [`classify`]): what a failure is and whether it is
//!   worth retrying.
//! - **Reporting** ([`ErrorReporter`]): the bounded error history every
//!   layer reports into.
//! - **Wire payloads** ([`LoginRequest`], [`AuthResponse`], ...): bodies
//!   exchanged with the auth backend.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how bodies become bytes.
//!
//! ```text
//! Session / Connection (above) → Protocol (records, payloads) → Transport (bytes)
//! ```

mod classify;
mod codec;
mod error;
mod record;
mod reporter;
mod wire;

pub use classify::{Classification, classify, codes};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use record::{ErrorCategory, ErrorRecord, ErrorSeverity};
pub use reporter::{DEFAULT_HISTORY_CAPACITY, ErrorReporter};
pub use wire::{
    AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, UserPayload,
};
