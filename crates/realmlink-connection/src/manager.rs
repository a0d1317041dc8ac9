//! Connection manager: owns one persistent socket and keeps it alive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use realmlink_protocol::{ErrorCategory, ErrorRecord, ErrorReporter, codes};
use realmlink_retry::RetryScheduler;
use realmlink_transport::{CLOSE_NORMAL, SocketConnection, SocketTransport, TransportError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::driver::{Outgoing, spawn_driver};
use crate::{ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionState};

/// Mutable connection state. Never held across an await.
#[derive(Default)]
pub(crate) struct Inner {
    pub(crate) state: ConnectionState,
    /// Bumped on every open; drivers and opens from older generations are
    /// ignored.
    pub(crate) generation: u64,
    url: Option<String>,
    headers: Vec<(String, String)>,
    auth_token: Option<String>,
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
    /// Close requested while still connecting.
    pending_close: Option<(u16, String)>,
}

/// A request from the reconnect timer to the reconnect worker.
struct ReconnectRequest {
    reply: oneshot::Sender<bool>,
}

pub(crate) struct Shared<T> {
    pub(crate) config: ConnectionConfig,
    transport: T,
    pub(crate) inner: Mutex<Inner>,
    reconnect: RetryScheduler,
    /// Bumped whenever the reconnect cycle is cancelled on purpose, so its
    /// completion callback can tell cancellation from exhaustion.
    cancel_epoch: AtomicU64,
    /// A drop arrived while the previous cycle was still resolving its
    /// last attempt. The cycle's completion starts a new one.
    reschedule: AtomicBool,
    events: broadcast::Sender<ConnectionEvent>,
    errors: ErrorReporter,
    worker_tx: mpsc::UnboundedSender<ReconnectRequest>,
}

impl<T> Shared<T> {
    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn cancel_reconnect(&self) {
        self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        self.reschedule.store(false, Ordering::SeqCst);
        self.reconnect.cancel();
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}

/// Manages a single persistent connection with automatic reconnection.
///
/// Cloning yields another handle to the same connection. Event
/// subscriptions belong to the manager, not to any one socket, so they
/// survive reconnects.
///
/// # Reconnection
///
/// A drop with a close code other than 1000, or a connection error,
/// schedules reconnect attempts after `reconnect_delay`, doubling each
/// time, up to `max_reconnect_attempts`. An explicit
/// [`disconnect`](Self::disconnect) never reconnects and cancels any
/// attempt that is waiting.
///
/// ## How a reconnect cycle runs
///
/// Reconnection is a [`RetryScheduler`] cycle. The manager hands it an
/// action ("open the socket again") and the scheduler owns the timing:
///
/// ```text
/// drop (1006) ──→ wait reconnect_delay ──→ open ──ok──→ Connected
///                                            │ fail
///                                            ▼
///                              wait 2 × reconnect_delay ──→ open ──→ ...
///                                            │ attempts exhausted
///                                            ▼
///                                  ReconnectFailed { attempts }
/// ```
///
/// The scheduler cannot call back into the manager while the manager
/// owns it, so the action only posts a request to a worker task. The
/// worker holds a [`Weak`] reference, performs the open, and reports
/// success or failure back to the cycle. Dropping every handle ends the
/// worker and cancels a waiting timer.
///
/// ## Drops during a cycle
///
/// A reconnected socket can fail again before the cycle that opened it
/// has finished reporting. The scheduler refuses to start a second cycle
/// while one is active, so the manager records that another reconnect is
/// owed. When the running cycle completes it checks that record and, if
/// set, starts a fresh cycle with a full attempt budget. No drop goes
/// unanswered and two cycles never run at once.
///
/// ## Type parameter explained
///
/// `T: SocketTransport` is the thing that actually opens sockets. The
/// manager never touches WebSocket frames itself. Swapping `T` for a
/// scripted fake is how the tests replay drops and failed opens on a
/// paused clock.
pub struct ConnectionManager<T: SocketTransport> {
    pub(crate) shared: Arc<Shared<T>>,
}

impl<T: SocketTransport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: SocketTransport> ConnectionManager<T> {
    /// Creates a disconnected manager. Must be called inside a Tokio runtime.
    pub fn new(config: ConnectionConfig, transport: T, errors: ErrorReporter) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let reconnect = RetryScheduler::new("reconnect", config.reconnect_policy());

        let shared = Arc::new(Shared {
            config,
            transport,
            inner: Mutex::new(Inner::default()),
            reconnect,
            cancel_epoch: AtomicU64::new(0),
            reschedule: AtomicBool::new(false),
            events,
            errors,
            worker_tx,
        });

        tokio::spawn(reconnect_worker(Arc::downgrade(&shared), worker_rx));
        Self { shared }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// URL of the last `connect`, if any.
    pub fn current_url(&self) -> Option<String> {
        self.shared.inner.lock().url.clone()
    }

    /// Token sent as `Authorization: Bearer` on later opens. An open
    /// connection is left alone.
    pub fn set_auth_token(&self, token: Option<String>) {
        self.shared.inner.lock().auth_token = token.filter(|t| !t.is_empty());
    }

    /// Whether a reconnect cycle is waiting or running.
    pub fn reconnect_pending(&self) -> bool {
        self.shared.reconnect.is_active()
    }

    /// Length of the reconnect timer currently armed, if any.
    pub fn reconnect_delay_armed(&self) -> Option<std::time::Duration> {
        self.shared.reconnect.armed_delay()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.shared.errors
    }

    /// Opens a connection to `url`.
    ///
    /// Only valid while Disconnected. A reconnect cycle that is waiting is
    /// cancelled. If the open fails, reconnection is scheduled and the
    /// error is returned.
    pub async fn connect(
        &self,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Result<(), ConnectionError> {
        let url = url.into();
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.state != ConnectionState::Disconnected {
                return Err(ConnectionError::InvalidState(inner.state));
            }
            inner.state = ConnectionState::Connecting;
            inner.generation += 1;
            inner.url = Some(url.clone());
            inner.headers = headers;
            inner.pending_close = None;
            inner.generation
        };
        self.shared.cancel_reconnect();

        info!(%url, "connecting");
        self.open(generation, false).await
    }

    /// Closes the connection with `code` and `reason`.
    ///
    /// From Connected or Connecting this moves to Closing and the
    /// [`ConnectionEvent::Closed`] event follows once the socket is shut.
    /// In every state a waiting reconnect is cancelled; none is scheduled.
    pub fn disconnect(&self, code: u16, reason: &str) {
        self.shared.cancel_reconnect();

        let closed_now = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Connected => {
                    inner.state = ConnectionState::Closing;
                    let sent = inner.outgoing.as_ref().is_some_and(|tx| {
                        tx.send(Outgoing::Close {
                            code,
                            reason: reason.to_owned(),
                        })
                        .is_ok()
                    });
                    if !sent {
                        // Driver is already gone.
                        inner.state = ConnectionState::Disconnected;
                        inner.outgoing = None;
                    }
                    !sent
                }
                ConnectionState::Connecting => {
                    inner.state = ConnectionState::Closing;
                    inner.pending_close = Some((code, reason.to_owned()));
                    false
                }
                ConnectionState::Closing | ConnectionState::Disconnected => false,
            }
        };

        info!(code, reason, "disconnect requested");
        if closed_now {
            self.shared.emit(ConnectionEvent::Closed {
                code,
                reason: reason.to_owned(),
            });
        }
    }

    /// Queues a text message. Returns `false`, doing nothing, unless
    /// Connected.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        self.send(Outgoing::Text(text.into()))
    }

    /// Queues a binary message. Returns `false`, doing nothing, unless
    /// Connected.
    pub fn send_binary(&self, data: Vec<u8>) -> bool {
        self.send(Outgoing::Binary(data))
    }

    fn send(&self, message: Outgoing) -> bool {
        let inner = self.shared.inner.lock();
        if inner.state != ConnectionState::Connected {
            return false;
        }
        inner
            .outgoing
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    // -- Internals ----------------------------------------------------------

    /// Runs one open for `generation`. `scheduled` opens belong to a
    /// reconnect cycle, which handles their failures itself.
    async fn open(&self, generation: u64, scheduled: bool) -> Result<(), ConnectionError> {
        let (url, headers) = {
            let inner = self.shared.inner.lock();
            let mut headers = inner.headers.clone();
            if let Some(token) = &inner.auth_token {
                if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("authorization")) {
                    headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
                }
            }
            (inner.url.clone().unwrap_or_default(), headers)
        };

        let timeout = self.shared.config.connect_timeout;
        let protocol = self.shared.config.protocol.as_deref();
        let opened = match tokio::time::timeout(
            timeout,
            self.shared.transport.open(&url, protocol, &headers),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ConnectionError::Transport(e)),
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        };

        match opened {
            Ok(conn) => self.on_open(generation, conn).await,
            Err(err) => self.on_open_failed(generation, scheduled, &url, err),
        }
    }

    async fn on_open(&self, generation: u64, conn: T::Connection) -> Result<(), ConnectionError> {
        let (tx, rx) = mpsc::unbounded_channel();

        enum Outcome {
            Stale,
            CloseRequested(u16, String),
            Open,
        }

        let outcome = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                Outcome::Stale
            } else if inner.state == ConnectionState::Closing {
                inner.state = ConnectionState::Disconnected;
                let (code, reason) = inner
                    .pending_close
                    .take()
                    .unwrap_or((CLOSE_NORMAL, String::new()));
                Outcome::CloseRequested(code, reason)
            } else {
                inner.state = ConnectionState::Connected;
                inner.outgoing = Some(tx);
                Outcome::Open
            }
        };

        match outcome {
            Outcome::Stale => {
                debug!(conn = %conn.id(), "stale open, closing");
                let _ = conn.close(CLOSE_NORMAL, "superseded").await;
                Err(ConnectionError::Aborted)
            }
            Outcome::CloseRequested(code, reason) => {
                debug!(conn = %conn.id(), "disconnected while connecting");
                let _ = conn.close(code, &reason).await;
                self.shared.emit(ConnectionEvent::Closed { code, reason });
                Err(ConnectionError::Aborted)
            }
            Outcome::Open => {
                info!(conn = %conn.id(), "connected");
                spawn_driver(Arc::downgrade(&self.shared), conn, rx, generation);
                self.shared.emit(ConnectionEvent::Connected);
                Ok(())
            }
        }
    }

    fn on_open_failed(
        &self,
        generation: u64,
        scheduled: bool,
        url: &str,
        err: ConnectionError,
    ) -> Result<(), ConnectionError> {
        let closing = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return Err(ConnectionError::Aborted);
            }
            let closing = inner.pending_close.take();
            inner.state = ConnectionState::Disconnected;
            closing
        };

        if let Some((code, reason)) = closing {
            self.shared.emit(ConnectionEvent::Closed { code, reason });
            return Err(ConnectionError::Aborted);
        }

        warn!(%url, error = %err, "connection failed");
        self.shared
            .errors
            .report(ErrorRecord::from(&err).with_context(url.to_owned()));
        self.shared
            .emit(ConnectionEvent::ConnectionError(err.to_string()));
        if !scheduled {
            schedule_reconnect(&self.shared);
        }
        Err(err)
    }

    /// One attempt of a reconnect cycle.
    async fn reconnect_attempt(&self) -> bool {
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.state != ConnectionState::Disconnected {
                return inner.state == ConnectionState::Connected;
            }
            inner.state = ConnectionState::Connecting;
            inner.generation += 1;
            inner.generation
        };
        info!(
            attempt = self.shared.reconnect.attempt_count(),
            "reconnecting"
        );
        self.open(generation, true).await.is_ok()
    }
}

impl<T: SocketTransport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &inner.state)
            .field("url", &inner.url)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Driver callbacks
// ---------------------------------------------------------------------------

/// The peer closed the connection, or a requested close finished.
pub(crate) fn on_closed<T: Send + Sync + 'static>(
    shared: &Arc<Shared<T>>,
    generation: u64,
    code: u16,
    reason: String,
) {
    let was = {
        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.outgoing = None;
        std::mem::replace(&mut inner.state, ConnectionState::Disconnected)
    };

    info!(code, %reason, "connection closed");
    shared.emit(ConnectionEvent::Closed { code, reason });
    if was != ConnectionState::Closing && code != CLOSE_NORMAL {
        schedule_reconnect(shared);
    }
}

/// The connection broke without a close handshake.
pub(crate) fn on_error<T: Send + Sync + 'static>(
    shared: &Arc<Shared<T>>,
    generation: u64,
    err: TransportError,
) {
    let was = {
        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.outgoing = None;
        std::mem::replace(&mut inner.state, ConnectionState::Disconnected)
    };

    warn!(error = %err, "connection error");
    shared.errors.report(ErrorRecord::new(
        codes::SOCKET_ERROR,
        err.to_string(),
        ErrorCategory::Network,
    ));
    shared.emit(ConnectionEvent::ConnectionError(err.to_string()));
    if was != ConnectionState::Closing {
        schedule_reconnect(shared);
    }
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

/// Starts a reconnect cycle after an unexpected drop.
///
/// The cycle that produced the current socket may not have resolved yet:
/// its last attempt succeeded, but the scheduler has not seen the result.
/// A start in that window is refused, so the drop is parked in
/// `reschedule` and the finishing cycle starts the next one.
fn schedule_reconnect<T: Send + Sync + 'static>(shared: &Arc<Shared<T>>) {
    if shared.config.max_reconnect_attempts == 0 {
        debug!("reconnection disabled");
        return;
    }

    loop {
        if start_cycle(shared) {
            return;
        }
        shared.reschedule.store(true, Ordering::SeqCst);
        // Still resolving: the completion will see the flag. Otherwise the
        // cycle finished in between and whoever clears the flag restarts.
        if shared.reconnect.is_active() || !shared.reschedule.swap(false, Ordering::SeqCst) {
            debug!("reconnect deferred until the current cycle resolves");
            return;
        }
    }
}

fn start_cycle<T: Send + Sync + 'static>(shared: &Arc<Shared<T>>) -> bool {
    let attempts = shared.config.max_reconnect_attempts;
    let epoch = shared.cancel_epoch.load(Ordering::SeqCst);
    let first_delay = shared.reconnect.policy().delay_for(0);
    let tx = shared.worker_tx.clone();
    let weak = Arc::downgrade(shared);

    let started = shared.reconnect.start_after(
        first_delay,
        move || {
            let tx = tx.clone();
            async move {
                let (reply, rx) = oneshot::channel();
                if tx.send(ReconnectRequest { reply }).is_err() {
                    return false;
                }
                rx.await.unwrap_or(false)
            }
        },
        move |ok| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if shared.cancel_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            if shared.reschedule.swap(false, Ordering::SeqCst) {
                debug!("connection dropped while the reconnect cycle resolved");
                schedule_reconnect(&shared);
                return;
            }
            if ok {
                debug!("reconnected");
                return;
            }
            warn!(attempts, "giving up on reconnection");
            shared.emit(ConnectionEvent::ReconnectFailed { attempts });
        },
    );

    if started {
        info!(delay_ms = first_delay.as_millis() as u64, "reconnect scheduled");
    }
    started
}

async fn reconnect_worker<T: SocketTransport>(
    shared: Weak<Shared<T>>,
    mut rx: mpsc::UnboundedReceiver<ReconnectRequest>,
) {
    while let Some(request) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let ok = ConnectionManager { shared }.reconnect_attempt().await;
        let _ = request.reply.send(ok);
    }
    debug!("reconnect worker stopped");
}
