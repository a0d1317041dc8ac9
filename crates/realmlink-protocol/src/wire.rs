//! Request and response bodies exchanged with the auth backend.
//!
//! Responses are deliberately lenient: every field is optional and a few
//! have aliases, because different backend builds name them differently.
//! Deciding whether a response means success is the session layer's job;
//! these types only carry what was on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /auth/login`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/register`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Body of `POST /auth/refresh`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// User object as the backend sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserPayload {
    #[serde(alias = "user_id")]
    pub id: String,
    pub email: String,
    pub username: String,
    /// RFC 3339 timestamp, when the backend includes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Any response from the auth endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(alias = "user_info", skip_serializing_if = "Option::is_none")]
    pub user: Option<UserPayload>,
    /// Set by register endpoints that answer with a bare id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthResponse {
    /// The most specific human-readable failure text in the body.
    pub fn failure_message(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .or(self.message.as_deref())
            .filter(|m| !m.is_empty())
    }

    /// `true` only when the body explicitly says `"success": false`.
    pub fn is_explicit_failure(&self) -> bool {
        self.success == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_parses_token_shape() {
        let body = r#"{
            "access_token": "AT",
            "refresh_token": "RT",
            "expires_in": 3600,
            "user": {"id": "12345", "email": "test@test.com", "username": "TestUser"}
        }"#;
        let resp: AuthResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.access_token.as_deref(), Some("AT"));
        assert_eq!(resp.expires_in, Some(3600));
        assert_eq!(resp.user.unwrap().username, "TestUser");
        assert_eq!(resp.success, None);
    }

    #[test]
    fn test_auth_response_accepts_user_info_and_user_id_aliases() {
        let body = r#"{
            "success": true,
            "user_info": {"user_id": "u-9", "email": "a@b.io", "username": "abc"}
        }"#;
        let resp: AuthResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.user.unwrap().id, "u-9");
        assert_eq!(resp.success, Some(true));
    }

    #[test]
    fn test_failure_message_prefers_error_message() {
        let resp = AuthResponse {
            error_message: Some("Invalid credentials".into()),
            message: Some("generic".into()),
            ..Default::default()
        };
        assert_eq!(resp.failure_message(), Some("Invalid credentials"));

        let resp = AuthResponse {
            error_message: Some(String::new()),
            message: Some("generic".into()),
            ..Default::default()
        };
        assert_eq!(resp.failure_message(), None);
    }

    #[test]
    fn test_request_debug_redacts_secrets() {
        let req = LoginRequest {
            email: "test@test.com".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{req:?}");
        assert!(shown.contains("test@test.com"));
        assert!(!shown.contains("hunter2"));

        let req = RefreshRequest {
            refresh_token: "RT-secret".into(),
        };
        assert!(!format!("{req:?}").contains("RT-secret"));
    }
}
