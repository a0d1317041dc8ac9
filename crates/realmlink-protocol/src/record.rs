//! The structured failure datum shared by every layer.
//!
//! An [`ErrorRecord`] is created at the point of failure and never mutated
//! afterwards. Records travel to callers as the `Err` side of results, to
//! subscribers as event payloads, and into the [`ErrorReporter`](crate::ErrorReporter)
//! history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::classify;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Which subsystem a failure belongs to.
///
/// Each category owns a numeric code range:
///
/// ```text
/// Network    1000–1999
/// Auth       2000–2999
/// Protocol   3000–3999
/// GameLogic  4000–4999
/// System     5000–5999
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Network,
    Auth,
    Protocol,
    GameLogic,
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network"),
            Self::Auth => write!(f, "Auth"),
            Self::Protocol => write!(f, "Protocol"),
            Self::GameLogic => write!(f, "GameLogic"),
            Self::System => write!(f, "System"),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorSeverity
// ---------------------------------------------------------------------------

/// How bad a failure is. Ordered from least to most severe.
///
/// `Info` is never derived from a code; only [`ErrorRecord::info`] sets it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorRecord
// ---------------------------------------------------------------------------

/// A single failure: code, category, severity, message, and when it happened.
///
/// Implements [`std::error::Error`], so it can be returned with `?` and
/// boxed like any other error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category} {code}] {message}")]
pub struct ErrorRecord {
    pub code: i32,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub timestamp: DateTime<Utc>,
    /// Free-form detail such as the endpoint or URL involved.
    pub context: Option<String>,
}

impl ErrorRecord {
    /// Creates a record whose severity is derived from `code`.
    pub fn new(code: i32, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            code,
            message: message.into(),
            category,
            severity: classify(code, category).severity,
            timestamp: Utc::now(),
            context: None,
        }
    }

    /// Creates an informational record. This is the only way to get
    /// [`ErrorSeverity::Info`].
    pub fn info(code: i32, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            severity: ErrorSeverity::Info,
            ..Self::new(code, message, category)
        }
    }

    /// Attaches context, consuming and returning the record.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Whether the classifier marks this failure as worth retrying.
    pub fn is_retryable(&self) -> bool {
        classify(self.code, self.category).retryable
    }
}
