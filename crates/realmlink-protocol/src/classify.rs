//! Pure classification of error codes into severity and retry policy.

use crate::{ErrorCategory, ErrorSeverity};

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub severity: ErrorSeverity,
    pub retryable: bool,
}

/// Maps a code and category to a severity and a retry decision.
///
/// - Severity: `code >= 5000` is Critical, `4000..5000` is Error, anything
///   else is Warning.
/// - Retryable: Network codes in `1000..1100`, and Auth code
///   [`codes::TOKEN_EXPIRED`]. Nothing else.
pub fn classify(code: i32, category: ErrorCategory) -> Classification {
    let severity = if code >= 5000 {
        ErrorSeverity::Critical
    } else if code >= 4000 {
        ErrorSeverity::Error
    } else {
        ErrorSeverity::Warning
    };

    let retryable = match category {
        ErrorCategory::Network => (1000..1100).contains(&code),
        ErrorCategory::Auth => code == codes::TOKEN_EXPIRED,
        _ => false,
    };

    Classification { severity, retryable }
}

/// Well-known error codes, grouped by category range.
pub mod codes {
    // Network (1000–1999)
    pub const NO_RESPONSE: i32 = 1001;
    pub const TIMEOUT: i32 = 1002;
    pub const SOCKET_ERROR: i32 = 1003;
    pub const SERVER_UNAVAILABLE: i32 = 1004;
    pub const THROTTLED: i32 = 1005;

    // Auth (2000–2999)
    pub const TOKEN_EXPIRED: i32 = 2001;
    pub const NO_SAVED_CREDENTIALS: i32 = 2002;
    pub const INVALID_CREDENTIALS: i32 = 2003;
    pub const REFRESH_REJECTED: i32 = 2004;
    pub const NOT_LOGGED_IN: i32 = 2005;
    pub const FORBIDDEN: i32 = 2006;
    pub const ALREADY_EXISTS: i32 = 2007;
    pub const INVALID_INPUT: i32 = 2010;
    pub const OPERATION_IN_PROGRESS: i32 = 2011;
    pub const SUPERSEDED: i32 = 2012;

    // Protocol (3000–3999)
    pub const MALFORMED_BODY: i32 = 3000;
    pub const BAD_LOGIN_RESPONSE: i32 = 3001;
    pub const BAD_REGISTER_RESPONSE: i32 = 3002;
    pub const BAD_REFRESH_RESPONSE: i32 = 3003;
    pub const REQUEST_REJECTED: i32 = 3004;
    pub const INVALID_TOKEN_LIFETIME: i32 = 3005;

    // System (5000–5999)
    pub const INTERNAL: i32 = 5001;
    pub const PERSISTENCE_FAILED: i32 = 5002;
    pub const UNEXPECTED_STATUS: i32 = 5003;
}
