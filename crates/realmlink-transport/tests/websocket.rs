//! Integration tests for the WebSocket client transport.
//!
//! Each test spins up a real `tokio-tungstenite` server on a random local
//! port and drives it against [`WebSocketTransport`].

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::{Arc, Mutex};

    use futures_util::{SinkExt, StreamExt};
    use realmlink_transport::{
        CLOSE_ABNORMAL, SocketConnection, SocketEvent, SocketTransport, TransportError,
        WebSocketTransport,
    };
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds to an OS-assigned port and returns the listener plus its URL.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    /// Accepts one client, recording its handshake headers and echoing the
    /// requested sub-protocol.
    async fn accept_recording(
        listener: TcpListener,
        seen: Arc<Mutex<Vec<(String, String)>>>,
    ) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
            let mut seen = seen.lock().unwrap();
            for (name, value) in req.headers() {
                seen.push((
                    name.as_str().to_owned(),
                    value.to_str().unwrap_or_default().to_owned(),
                ));
            }
            if let Some(proto) = req.headers().get("Sec-WebSocket-Protocol") {
                resp.headers_mut().insert("Sec-WebSocket-Protocol", proto.clone());
            }
            Ok(resp)
        })
        .await
        .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_open_sends_headers_and_protocol() {
        let (listener, url) = listen().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let server = tokio::spawn(accept_recording(listener, Arc::clone(&seen)));

        let headers = vec![("Authorization".to_owned(), "Bearer AT".to_owned())];
        let conn = WebSocketTransport::new()
            .open(&url, Some("mmorpg"), &headers)
            .await
            .expect("client should connect");
        let _server_ws = server.await.expect("server task");

        let seen = seen.lock().unwrap().clone();
        let header = |n: &str| seen.iter().find(|(k, _)| k.eq_ignore_ascii_case(n)).map(|(_, v)| v.clone());
        assert_eq!(header("authorization").as_deref(), Some("Bearer AT"));
        assert_eq!(header("sec-websocket-protocol").as_deref(), Some("mmorpg"));
        assert!(conn.id().into_inner() > 0);
    }

    #[tokio::test]
    async fn test_text_and_binary_round_trip() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept_recording(listener, Arc::default()));

        let conn = WebSocketTransport::new().open(&url, None, &[]).await.expect("connect");
        let mut server_ws = server.await.expect("server task");

        // Client to server.
        conn.send_text("hello".into()).await.expect("send text");
        conn.send_binary(vec![1, 2, 3]).await.expect("send binary");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "hello");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), &[1, 2, 3]);

        // Server to client.
        server_ws.send(Message::Text("world".to_owned().into())).await.unwrap();
        server_ws.send(Message::Binary(vec![9u8, 8].into())).await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), SocketEvent::Text("world".into()));
        assert_eq!(conn.recv().await.unwrap(), SocketEvent::Binary(vec![9, 8]));
    }

    #[tokio::test]
    async fn test_client_close_reports_server_echoed_code() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept_recording(listener, Arc::default()));

        let conn = WebSocketTransport::new().open(&url, None, &[]).await.expect("connect");
        let mut server_ws = server.await.expect("server task");
        // Drive the server side so it answers the close frame.
        let server_task = tokio::spawn(async move { while let Some(Ok(_)) = server_ws.next().await {} });

        conn.close(1000, "Normal Closure").await.expect("close");
        match conn.recv().await.expect("recv") {
            SocketEvent::Closed { code, .. } => assert_eq!(code, 1000),
            other => panic!("expected Closed, got {other:?}"),
        }
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_server_reports_abnormal_close() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept_recording(listener, Arc::default()));

        let conn = WebSocketTransport::new().open(&url, None, &[]).await.expect("connect");
        let server_ws = server.await.expect("server task");
        drop(server_ws);

        match conn.recv().await {
            Ok(SocketEvent::Closed { code, .. }) => assert_eq!(code, CLOSE_ABNORMAL),
            // Some platforms surface the reset as an error instead.
            Err(TransportError::ReceiveFailed(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_refused_is_connect_failed() {
        let (listener, url) = listen().await;
        drop(listener);

        let result = WebSocketTransport::new().open(&url, None, &[]).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_open_bad_url_is_invalid_request() {
        let result = WebSocketTransport::new().open("not a url", None, &[]).await;
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }
}
