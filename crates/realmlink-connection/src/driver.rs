//! Connection driver: a Tokio task that owns one open socket.
//!
//! The manager never touches the socket after the open. It hands the
//! connection to a driver task and talks to it through an mpsc channel,
//! the same actor shape as everywhere else in the workspace. The driver
//! pumps queued sends out, pumps received frames into manager events, and
//! reports how the connection ended.

use std::sync::Weak;
use std::time::Duration;

use realmlink_transport::{CLOSE_NORMAL, SocketConnection, SocketEvent, TransportError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::ConnectionEvent;
use crate::manager::{Shared, on_closed, on_error};

/// Work queued for the driver by the manager.
#[derive(Debug)]
pub(crate) enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
}

/// How the driver loop ended.
enum Ending {
    /// Peer closed, or our close completed.
    Closed { code: u16, reason: String },
    /// The socket failed.
    Failed(TransportError),
    /// The manager is gone.
    Abandoned,
}

pub(crate) fn spawn_driver<T, C>(
    shared: Weak<Shared<T>>,
    conn: C,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    generation: u64,
) where
    T: Send + Sync + 'static,
    C: SocketConnection,
{
    tokio::spawn(async move {
        let id = conn.id();
        debug!(conn = %id, generation, "driver started");
        let close_timeout = match shared.upgrade() {
            Some(s) => s.config.close_timeout,
            None => return,
        };

        let ending = drive(&shared, &conn, outgoing, close_timeout).await;

        let Some(shared) = shared.upgrade() else {
            return;
        };
        match ending {
            Ending::Closed { code, reason } => on_closed(&shared, generation, code, reason),
            Ending::Failed(err) => on_error(&shared, generation, err),
            Ending::Abandoned => {}
        }
        debug!(conn = %id, "driver stopped");
    });
}

async fn drive<T, C: SocketConnection>(
    shared: &Weak<Shared<T>>,
    conn: &C,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    close_timeout: Duration,
) -> Ending {
    loop {
        tokio::select! {
            command = outgoing.recv() => {
                let result = match command {
                    Some(Outgoing::Text(text)) => conn.send_text(text).await,
                    Some(Outgoing::Binary(data)) => conn.send_binary(data).await,
                    Some(Outgoing::Close { code, reason }) => {
                        return close(conn, code, reason, close_timeout).await;
                    }
                    None => {
                        let _ = conn.close(CLOSE_NORMAL, "").await;
                        return Ending::Abandoned;
                    }
                };
                if let Err(e) = result {
                    return Ending::Failed(e);
                }
            }
            event = conn.recv() => {
                let event = match event {
                    Ok(SocketEvent::Text(text)) => {
                        trace!(len = text.len(), "text frame received");
                        ConnectionEvent::MessageReceived(text)
                    }
                    Ok(SocketEvent::Binary(data)) => {
                        trace!(len = data.len(), "binary frame received");
                        ConnectionEvent::BinaryMessageReceived(data)
                    }
                    Ok(SocketEvent::Closed { code, reason }) => {
                        return Ending::Closed { code, reason };
                    }
                    Err(e) => return Ending::Failed(e),
                };
                match shared.upgrade() {
                    Some(shared) => shared.emit(event),
                    None => {
                        let _ = conn.close(CLOSE_NORMAL, "").await;
                        return Ending::Abandoned;
                    }
                }
            }
        }
    }
}

/// Sends our close frame and waits (bounded) for the peer's reply. The
/// reported code and reason are always the ones we asked for.
async fn close<C: SocketConnection>(
    conn: &C,
    code: u16,
    reason: String,
    close_timeout: Duration,
) -> Ending {
    if let Err(e) = conn.close(code, &reason).await {
        debug!(error = %e, "close frame not sent");
        return Ending::Closed { code, reason };
    }

    let acknowledged = tokio::time::timeout(close_timeout, async {
        loop {
            match conn.recv().await {
                Ok(SocketEvent::Closed { .. }) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    if acknowledged.is_err() {
        debug!(code, "peer did not acknowledge close in time");
    }
    Ending::Closed { code, reason }
}
