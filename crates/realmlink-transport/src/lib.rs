//! Transport abstraction layer for Realmlink.
//!
//! The session core never opens a socket or an HTTP connection itself. It
//! talks to these traits, and the composition root decides what sits
//! behind them:
//!
//! - [`HttpTransport`]: one request in, one `(status, body)` out.
//! - [`SocketTransport`] / [`SocketConnection`]: a persistent, message
//!   oriented connection (WebSocket in production, a scripted fake in tests).
//!
//! # Feature Flags
//!
//! - `http` (default): [`ReqwestTransport`] via `reqwest`
//! - `websocket` (default): [`WebSocketTransport`] via `tokio-tungstenite`

mod error;
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "http")]
pub use http::ReqwestTransport;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;

/// Close code for a normal, intentional shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the peer sent a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code reported when the stream ended without any close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// An outgoing HTTP request.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First header with this name, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Headers may carry bearer tokens and bodies may carry passwords.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &names)
            .field("body_len", &self.body.as_ref().map(String::len))
            .finish()
    }
}

/// The status and raw body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one HTTP request and waits for its response.
///
/// Any status code is a successful `request`; only failing to get a
/// response at all is an error.
pub trait HttpTransport: Send + Sync + 'static {
    fn request(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// Sockets
// ---------------------------------------------------------------------------

/// Opaque identifier for a socket connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that arrived on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Binary(Vec<u8>),
    /// The connection is over. No further events follow.
    Closed { code: u16, reason: String },
}

/// Opens outgoing socket connections.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` lets one transport be shared by the connection
///   manager and its reconnect worker, which may run on different
///   runtime threads.
/// - `'static` means the transport owns everything it needs. It lives
///   inside long-lived spawned tasks, so it cannot borrow from a caller.
///
/// ## Why `impl Future + Send` instead of `async fn`
///
/// `open` is declared as returning `impl Future<Output = ...> + Send`.
/// Implementors still write a plain `async fn`. Spelling out the `Send`
/// bound in the trait is what lets generic callers hand the future to
/// `tokio::spawn`, which requires every future it runs to be `Send`.
/// A bare `async fn` in a trait makes no such promise.
///
/// The associated `Connection` type ties each transport to the kind of
/// connection it produces. The manager never names a concrete socket
/// type, so a scripted fake slots in wherever a real WebSocket would.
pub trait SocketTransport: Send + Sync + 'static {
    type Connection: SocketConnection;

    /// Connects to `url`, optionally requesting a sub-protocol, with extra
    /// handshake headers.
    fn open(
        &self,
        url: &str,
        protocol: Option<&str>,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// One open socket connection.
///
/// Sending and receiving may happen concurrently from different tasks.
pub trait SocketConnection: Send + Sync + 'static {
    fn send_text(&self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn send_binary(&self, data: Vec<u8>) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next event. After [`SocketEvent::Closed`] the
    /// connection is finished.
    fn recv(&self) -> impl Future<Output = Result<SocketEvent, TransportError>> + Send;

    /// Starts the closing handshake. The matching `Closed` event arrives
    /// through [`recv`](Self::recv).
    fn close(&self, code: u16, reason: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn id(&self) -> ConnectionId;
}
