//! WebSocket client transport using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, ConnectionId, SocketConnection, SocketEvent,
    SocketTransport, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A [`SocketTransport`] that dials `ws://` and `wss://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl SocketTransport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn open(
        &self,
        url: &str,
        protocol: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<Self::Connection, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let request_headers = request.headers_mut();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::InvalidRequest(format!("header {}: {e}", name.as_str()))
            })?;
            request_headers.insert(name, value);
        }
        if let Some(protocol) = protocol.filter(|p| !p.is_empty()) {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| TransportError::InvalidRequest(format!("protocol: {e}")))?;
            request_headers.insert("Sec-WebSocket-Protocol", value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, url, "WebSocket connected");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single client-side WebSocket connection.
///
/// The write and read halves are locked separately, so a task blocked in
/// [`recv`](SocketConnection::recv) never holds up a send.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }
}

impl SocketConnection for WebSocketConnection {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.send_message(Message::Text(text.into())).await
    }

    async fn send_binary(&self, data: Vec<u8>) -> Result<(), TransportError> {
        self.send_message(Message::Binary(data.into())).await
    }

    async fn recv(&self) -> Result<SocketEvent, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(SocketEvent::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => return Ok(SocketEvent::Binary(data.to_vec())),
                Some(Ok(Message::Close(Some(frame)))) => {
                    return Ok(SocketEvent::Closed {
                        code: u16::from(frame.code),
                        reason: frame.reason.as_str().to_owned(),
                    });
                }
                Some(Ok(Message::Close(None))) => {
                    return Ok(SocketEvent::Closed {
                        code: CLOSE_NO_STATUS,
                        reason: String::new(),
                    });
                }
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
                None => {
                    return Ok(SocketEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection dropped".to_owned(),
                    });
                }
            }
        }
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.send_message(Message::Close(Some(frame))).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
