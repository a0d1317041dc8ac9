//! Codec trait and implementations for request and response bodies.
//!
//! The session layer never calls `serde_json` directly. It goes through a
//! [`Codec`], so the body format can be swapped without touching the auth
//! flow.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because codecs live inside long-lived sessions
/// that are shared across tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Encodes into a UTF-8 string, for text bodies and text frames.
    fn encode_text<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        let bytes = self.encode(value)?;
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidMessage(format!("encoded body is not UTF-8: {e}")))
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use realmlink_protocol::{Codec, JsonCodec, LoginRequest};
///
/// let codec = JsonCodec;
/// let body = codec
///     .encode_text(&LoginRequest {
///         email: "test@test.com".into(),
///         password: "password".into(),
///     })
///     .unwrap();
/// assert!(body.contains("\"email\":\"test@test.com\""));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
