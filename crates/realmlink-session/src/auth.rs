//! The auth session: login, registration, logout, token refresh, and
//! auto-login from a remembered session.
//!
//! # Lifecycle
//!
//! [`AuthSession`] owns the session state machine (see
//! [`SessionState`]), the [`TokenStore`], and a single-shot refresh timer.
//! Every successful login or refresh re-arms the timer for
//! `expires_in - refresh_margin`, floored at `min_refresh_delay`.
//!
//! # Serialization
//!
//! Login, register, refresh, and auto-login share one operation gate.
//! A user call that finds the gate taken fails with
//! [`codes::OPERATION_IN_PROGRESS`] and changes nothing. The scheduled
//! refresh waits for the gate instead.
//!
//! Logout never waits. It bumps a generation counter, and any operation
//! that started under an older generation discards its result with
//! [`codes::SUPERSEDED`].
//!
//! # Scheduled refresh
//!
//! The timer cannot call back into the session directly (the session
//! owns the timer), so it posts the generation it was armed under to a
//! worker task spawned in [`AuthSession::new`]. The worker holds only a
//! [`Weak`] reference and exits once every handle is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use realmlink_protocol::{
    AuthResponse, Codec, ErrorCategory, ErrorRecord, ErrorReporter, JsonCodec, LoginRequest,
    RefreshRequest, RegisterRequest, UserPayload, codes,
};
use realmlink_retry::{RetryPolicy, RetryScheduler};
use realmlink_transport::{HttpRequest, HttpResponse, HttpTransport};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::validate::{validate_credentials, validate_registration};
use crate::{
    AuthConfig, AuthEvent, Credentials, KeyValueStore, LoginResult, Registration, SessionState,
    MAX_TOKEN_LIFETIME, TokenSet, TokenStore, UserIdentity,
};

const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Login,
    Register,
    Refresh,
    Logout,
}

impl Op {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Refresh => "refresh",
            Self::Logout => "logout",
        }
    }

    /// Code for a 2xx body that cannot be used.
    fn malformed_code(self) -> i32 {
        match self {
            Self::Login => codes::BAD_LOGIN_RESPONSE,
            Self::Register => codes::BAD_REGISTER_RESPONSE,
            Self::Refresh | Self::Logout => codes::BAD_REFRESH_RESPONSE,
        }
    }

    /// Code for a 401.
    fn unauthorized_code(self) -> i32 {
        match self {
            Self::Refresh => codes::REFRESH_REJECTED,
            _ => codes::INVALID_CREDENTIALS,
        }
    }

    /// Code for a 2xx body with `"success": false`.
    fn rejected_code(self) -> i32 {
        match self {
            Self::Login | Self::Logout => codes::INVALID_CREDENTIALS,
            Self::Register => codes::INVALID_INPUT,
            Self::Refresh => codes::REFRESH_REJECTED,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Tokens from a successful login or refresh, plus their lifetime.
struct Issued {
    tokens: TokenSet,
    lifetime: Duration,
}

// ---------------------------------------------------------------------------
// AuthSession
// ---------------------------------------------------------------------------

struct Inner<H, S> {
    config: AuthConfig,
    http: H,
    codec: JsonCodec,
    tokens: TokenStore<S>,
    state: Mutex<SessionState>,
    remember_me: AtomicBool,
    generation: AtomicU64,
    op_gate: tokio::sync::Mutex<()>,
    refresh: RetryScheduler,
    errors: ErrorReporter,
    events: broadcast::Sender<AuthEvent>,
    refresh_tx: mpsc::UnboundedSender<u64>,
}

impl<H, S> Drop for Inner<H, S> {
    fn drop(&mut self) {
        self.refresh.cancel();
    }
}

/// Client-side authentication session.
///
/// Cloning yields another handle to the same session. Every clone sees
/// the same state, tokens and event stream, so a UI task and a network
/// task can each hold one.
///
/// ## Type parameters explained
///
/// - `H: HttpTransport` is how requests reach the backend. Production
///   code plugs in the reqwest-backed transport; tests plug in
///   [`MockAuthBackend`](crate::MockAuthBackend), which answers from
///   memory and records what it was asked.
/// - `S: KeyValueStore` is where a remembered session is written.
///   [`JsonFileStore`](crate::JsonFileStore) persists to disk and
///   [`MemoryStore`](crate::MemoryStore) keeps it in the process.
///
/// Neither parameter is boxed. The session is generic over both, so the
/// compiler builds one concrete session per pairing and nothing pays for
/// dynamic dispatch.
///
/// ## Concurrency
///
/// The public methods take `&self`. State that changes lives behind
/// locks or atomics inside a shared `Arc`:
///
/// - The session state and the token store use `parking_lot` mutexes.
///   They are held only for short, synchronous updates and never across
///   an `.await`.
/// - Login, register, refresh and auto-login take an async operation
///   gate. A second user call fails fast with
///   [`codes::OPERATION_IN_PROGRESS`] instead of queueing behind the
///   first.
/// - Logout skips the gate. It bumps a generation counter, and an
///   operation still in flight notices the bump when its response
///   arrives and drops the result.
///
/// ## Token lifetimes
///
/// The backend reports `expires_in` in seconds. Zero, negative or missing
/// values are rejected with [`codes::INVALID_TOKEN_LIFETIME`]. Values above
/// [`MAX_TOKEN_LIFETIME`] are capped, so an absurd lifetime still yields a
/// valid expiry and a refresh timer that fires eventually.
///
/// ## Example
///
/// ```rust
/// use realmlink_protocol::ErrorReporter;
/// use realmlink_session::{AuthConfig, AuthSession, Credentials, MemoryStore, MockAuthBackend};
///
/// # async fn demo() {
/// let session = AuthSession::new(
///     AuthConfig::default(),
///     MockAuthBackend::new(),
///     MemoryStore::new(),
///     ErrorReporter::new(),
/// );
///
/// let mut events = session.subscribe();
/// match session.login(Credentials::new("test@test.com", "password")).await {
///     Ok(result) => println!("welcome back, {}", result.user.username),
///     Err(e) => println!("login failed: {}", e.message),
/// }
/// while let Ok(event) = events.try_recv() {
///     println!("{event:?}");
/// }
/// # }
/// ```
pub struct AuthSession<H, S> {
    inner: Arc<Inner<H, S>>,
}

impl<H, S> Clone for AuthSession<H, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: HttpTransport, S: KeyValueStore> AuthSession<H, S> {
    /// Creates a logged-out session. Must be called inside a Tokio runtime.
    pub fn new(config: AuthConfig, http: H, store: S, errors: ErrorReporter) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            config,
            http,
            codec: JsonCodec,
            tokens: TokenStore::new(store),
            state: Mutex::new(SessionState::LoggedOut),
            remember_me: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            op_gate: tokio::sync::Mutex::new(()),
            refresh: RetryScheduler::new("token-refresh", RetryPolicy::single_shot()),
            errors,
            events,
            refresh_tx,
        });

        tokio::spawn(refresh_worker(Arc::downgrade(&inner), refresh_rx));
        Self { inner }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn session_state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Logged in with an access token that has not expired yet.
    pub fn is_logged_in(&self) -> bool {
        self.session_state() == SessionState::LoggedIn
            && !self.inner.tokens.is_expired(Instant::now())
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.inner.tokens.user()
    }

    /// The current access token, or an empty string.
    pub fn access_token(&self) -> String {
        self.inner.tokens.access_token()
    }

    pub fn tokens(&self) -> Option<TokenSet> {
        self.inner.tokens.tokens()
    }

    pub fn remember_me(&self) -> bool {
        self.inner.remember_me.load(Ordering::SeqCst)
    }

    /// Changes "remember me". While logged in the persisted record is
    /// rewritten (or emptied) right away.
    pub fn set_remember_me(&self, remember: bool) {
        self.inner.remember_me.store(remember, Ordering::SeqCst);
        if self.session_state() == SessionState::LoggedIn {
            self.persist();
        }
    }

    /// Delay of the armed refresh timer, if one is waiting.
    pub fn refresh_timer_delay(&self) -> Option<Duration> {
        self.inner.refresh.armed_delay()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.inner.errors
    }

    // -- Operations ---------------------------------------------------------

    /// Logs in with email and password.
    pub async fn login(&self, credentials: Credentials) -> Result<LoginResult, ErrorRecord> {
        if let Err(e) = validate_credentials(&credentials) {
            return Err(self.login_failed(e));
        }
        let Ok(_gate) = self.inner.op_gate.try_lock() else {
            return Err(self.login_failed(busy()));
        };

        if self.session_state() == SessionState::LoggedIn {
            debug!("login while logged in, dropping the current session");
            self.reset_local();
        }
        let generation = self.begin(SessionState::LoggingIn);
        info!(email = %credentials.email, "logging in");

        let request = LoginRequest {
            email: credentials.email.clone(),
            password: credentials.password,
        };
        let now = Instant::now();
        let outcome = self.post(Op::Login, &request).await.and_then(|body| {
            let issued = issued(Op::Login, &body, None, now)?;
            let user = body
                .user
                .as_ref()
                .map(identity_from_payload)
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| UserIdentity {
                    email: credentials.email.clone(),
                    ..Default::default()
                });
            Ok((issued, user))
        });

        if self.is_superseded(generation) {
            return Err(self.login_failed(superseded(Op::Login)));
        }

        match outcome {
            Ok((issued, user)) => {
                let result = self.establish(issued, user);
                info!(user = %result.user.username, "logged in");
                self.emit(AuthEvent::LoginSucceeded(result.clone()));
                Ok(result)
            }
            Err(e) => {
                self.set_state(SessionState::LoggedOut);
                Err(self.login_failed(e))
            }
        }
    }

    /// Creates an account. Does not log in.
    pub async fn register(&self, registration: Registration) -> Result<UserIdentity, ErrorRecord> {
        if let Err(e) = validate_registration(&registration) {
            return Err(self.register_failed(e));
        }
        let Ok(_gate) = self.inner.op_gate.try_lock() else {
            return Err(self.register_failed(busy()));
        };

        info!(email = %registration.email, username = %registration.username, "registering");
        let request = RegisterRequest {
            email: registration.email.clone(),
            username: registration.username.clone(),
            password: registration.password,
        };

        match self.post(Op::Register, &request).await {
            Ok(body) => {
                let user = registered_identity(&body, &registration.email, &registration.username);
                info!(user_id = %user.id, "registered");
                self.emit(AuthEvent::RegisterSucceeded(user.clone()));
                Ok(user)
            }
            Err(e) => Err(self.register_failed(e)),
        }
    }

    /// Ends the session. Always succeeds locally.
    ///
    /// The server is told on a best-effort basis using the access token
    /// that was current before teardown. [`AuthEvent::LogoutCompleted`]
    /// is emitted every time, including when already logged out.
    pub async fn logout(&self) {
        let access_token = self.inner.tokens.access_token();
        let was = self.session_state();

        self.reset_local();
        if let Err(e) = self.inner.tokens.clear_persisted() {
            self.inner.errors.report(e.into());
        }
        info!(was = %was, "logged out");

        if !access_token.is_empty() {
            let url = self.inner.config.endpoint(Op::Logout.endpoint());
            let request = self
                .request(&url)
                .header("Authorization", format!("Bearer {access_token}"));
            match self.inner.http.request(request).await {
                Ok(resp) if resp.is_success() => debug!("server acknowledged logout"),
                Ok(resp) => warn!(status = resp.status, "server refused logout notification"),
                Err(e) => warn!(error = %e, "logout notification failed"),
            }
        }

        self.emit(AuthEvent::LogoutCompleted);
    }

    /// Exchanges the refresh token for a new token pair.
    ///
    /// A failed refresh ends the session. The call itself is never retried.
    pub async fn refresh_token(&self) -> Result<TokenSet, ErrorRecord> {
        let Ok(_gate) = self.inner.op_gate.try_lock() else {
            let e = busy();
            self.inner.errors.report(e.clone());
            return Err(e);
        };
        self.refresh_locked().await
    }

    /// Logs in from the remembered session, if there is one.
    pub async fn try_auto_login(&self) -> Result<LoginResult, ErrorRecord> {
        let Some(saved) = self.inner.tokens.load() else {
            return Err(self.login_failed(ErrorRecord::info(
                codes::NO_SAVED_CREDENTIALS,
                "No saved session",
                ErrorCategory::Auth,
            )));
        };
        let Ok(_gate) = self.inner.op_gate.try_lock() else {
            return Err(self.login_failed(busy()));
        };

        if self.session_state() == SessionState::LoggedIn {
            self.reset_local();
        }
        self.inner.remember_me.store(saved.remember_me, Ordering::SeqCst);
        let generation = self.begin(SessionState::LoggingIn);
        info!(user = %saved.user.username, "restoring saved session");

        let request = RefreshRequest {
            refresh_token: saved.refresh_token.clone(),
        };
        let now = Instant::now();
        let outcome = self
            .post(Op::Refresh, &request)
            .await
            .and_then(|body| issued(Op::Refresh, &body, Some(&saved.refresh_token), now));

        if self.is_superseded(generation) {
            return Err(self.login_failed(superseded(Op::Refresh)));
        }

        match outcome {
            Ok(issued) => {
                let result = self.establish(issued, saved.user);
                info!(user = %result.user.username, "saved session restored");
                self.emit(AuthEvent::LoginSucceeded(result.clone()));
                Ok(result)
            }
            Err(e) => {
                self.set_state(SessionState::LoggedOut);
                // A network hiccup should not cost the player their saved login.
                if matches!(e.category, ErrorCategory::Auth | ErrorCategory::Protocol) {
                    if let Err(store_err) = self.inner.tokens.clear_persisted() {
                        self.inner.errors.report(store_err.into());
                    }
                }
                Err(self.login_failed(e))
            }
        }
    }

    // -- Internals ----------------------------------------------------------

    /// Refresh body shared by the public call and the timer. Caller holds
    /// the operation gate.
    async fn refresh_locked(&self) -> Result<TokenSet, ErrorRecord> {
        let refresh_token = match (self.session_state(), self.inner.tokens.refresh_token()) {
            (SessionState::LoggedIn, Some(token)) => token,
            _ => {
                let e = ErrorRecord::new(codes::NOT_LOGGED_IN, "Not logged in", ErrorCategory::Auth);
                self.inner.errors.report(e.clone());
                return Err(e);
            }
        };

        let generation = self.begin(SessionState::RefreshingToken);
        debug!("refreshing access token");

        let request = RefreshRequest {
            refresh_token: refresh_token.clone(),
        };
        let now = Instant::now();
        let outcome = self
            .post(Op::Refresh, &request)
            .await
            .and_then(|body| issued(Op::Refresh, &body, Some(&refresh_token), now));

        if self.is_superseded(generation) {
            let e = superseded(Op::Refresh);
            self.inner.errors.report(e.clone());
            return Err(e);
        }

        match outcome {
            Ok(issued) => {
                let user = self.inner.tokens.user().unwrap_or_default();
                let result = self.establish(issued, user);
                info!("access token refreshed");
                self.emit(AuthEvent::TokenRefreshed(result.tokens.clone()));
                Ok(result.tokens)
            }
            Err(e) => {
                warn!(code = e.code, "token refresh failed, ending session");
                self.reset_local();
                if let Err(store_err) = self.inner.tokens.clear_persisted() {
                    self.inner.errors.report(store_err.into());
                }
                self.inner.errors.report(e.clone());
                self.emit(AuthEvent::SessionTerminated(e.clone()));
                Err(e)
            }
        }
    }

    /// Runs when the refresh timer armed under `generation` fires.
    async fn scheduled_refresh(&self, generation: u64) {
        let _gate = self.inner.op_gate.lock().await;
        if self.is_superseded(generation) || self.session_state() != SessionState::LoggedIn {
            debug!("scheduled refresh no longer applies");
            return;
        }
        if let Err(e) = self.refresh_locked().await {
            debug!(code = e.code, "scheduled refresh failed");
        }
    }

    /// Installs new tokens, enters LoggedIn, re-arms the timer, persists.
    fn establish(&self, issued: Issued, user: UserIdentity) -> LoginResult {
        self.inner.tokens.set(issued.tokens.clone(), user.clone());
        self.set_state(SessionState::LoggedIn);
        self.arm_refresh(issued.lifetime);
        self.persist();
        LoginResult {
            user,
            tokens: issued.tokens,
        }
    }

    fn arm_refresh(&self, lifetime: Duration) {
        self.inner.refresh.cancel();
        let delay = self.inner.config.refresh_delay(lifetime);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let tx = self.inner.refresh_tx.clone();
        self.inner.refresh.start_after(
            delay,
            move || {
                let tx = tx.clone();
                async move { tx.send(generation).is_ok() }
            },
            |_| {},
        );
        debug!(delay_secs = delay.as_secs(), "token refresh scheduled");
    }

    /// Writes the remembered session (or an empty record). Failures are
    /// reported, never fatal.
    fn persist(&self) {
        if let Err(e) = self.inner.tokens.persist(self.remember_me()) {
            self.inner.errors.report(e.into());
        }
    }

    /// Drops in-memory session state and supersedes in-flight operations.
    fn reset_local(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.refresh.cancel();
        self.inner.tokens.clear();
        self.set_state(SessionState::LoggedOut);
    }

    /// Enters `state` and returns the generation the operation runs under.
    fn begin(&self, state: SessionState) -> u64 {
        self.set_state(state);
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != generation
    }

    fn set_state(&self, next: SessionState) {
        let prev = std::mem::replace(&mut *self.inner.state.lock(), next);
        if prev != next {
            debug!(from = %prev, to = %next, "session state changed");
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn login_failed(&self, e: ErrorRecord) -> ErrorRecord {
        self.inner.errors.report(e.clone());
        self.emit(AuthEvent::LoginFailed(e.clone()));
        e
    }

    fn register_failed(&self, e: ErrorRecord) -> ErrorRecord {
        self.inner.errors.report(e.clone());
        self.emit(AuthEvent::RegisterFailed(e.clone()));
        e
    }

    fn request(&self, url: &str) -> HttpRequest {
        HttpRequest::post(url)
            .header("Content-Type", "application/json")
            .header("X-API-Version", self.inner.config.api_version.clone())
    }

    async fn post<B>(&self, op: Op, body: &B) -> Result<AuthResponse, ErrorRecord>
    where
        B: Serialize + Sync,
    {
        let url = self.inner.config.endpoint(op.endpoint());
        let text = self.inner.codec.encode_text(body).map_err(ErrorRecord::from)?;
        debug!(%url, "auth request");

        let response = self
            .inner
            .http
            .request(self.request(&url).body(text))
            .await
            .map_err(|e| ErrorRecord::from(e).with_context(url.clone()))?;

        interpret(op, &self.inner.codec, &response).map_err(|e| e.with_context(url))
    }
}

impl<H, S> fmt::Debug for AuthSession<H, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("state", &*self.inner.state.lock())
            .field("base_url", &self.inner.config.base_url)
            .finish_non_exhaustive()
    }
}

async fn refresh_worker<H: HttpTransport, S: KeyValueStore>(
    session: Weak<Inner<H, S>>,
    mut rx: mpsc::UnboundedReceiver<u64>,
) {
    while let Some(generation) = rx.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        AuthSession { inner }.scheduled_refresh(generation).await;
    }
    debug!("refresh worker stopped");
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

/// Turns an HTTP response into a usable body or an [`ErrorRecord`].
///
/// Status decides first. A 2xx body must decode and must not say
/// `"success": false`.
fn interpret(op: Op, codec: &JsonCodec, response: &HttpResponse) -> Result<AuthResponse, ErrorRecord> {
    if !response.is_success() {
        let body: Option<AuthResponse> = codec.decode(response.body.as_bytes()).ok();
        let message = body
            .as_ref()
            .and_then(AuthResponse::failure_message)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{op} failed with HTTP {}", response.status));

        let (code, category) = match response.status {
            400 => (codes::REQUEST_REJECTED, ErrorCategory::Protocol),
            401 => (op.unauthorized_code(), ErrorCategory::Auth),
            403 => (codes::FORBIDDEN, ErrorCategory::Auth),
            409 => (codes::ALREADY_EXISTS, ErrorCategory::Auth),
            408 | 429 => (codes::THROTTLED, ErrorCategory::Network),
            500..=599 => (codes::SERVER_UNAVAILABLE, ErrorCategory::Network),
            _ => (codes::UNEXPECTED_STATUS, ErrorCategory::System),
        };
        return Err(ErrorRecord::new(code, message, category));
    }

    let body: AuthResponse = codec.decode(response.body.as_bytes()).map_err(|e| {
        ErrorRecord::new(
            op.malformed_code(),
            format!("Unreadable {op} response: {e}"),
            ErrorCategory::Protocol,
        )
    })?;

    if body.is_explicit_failure() {
        let message = body
            .failure_message()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{op} was rejected"));
        return Err(ErrorRecord::new(op.rejected_code(), message, ErrorCategory::Auth));
    }
    Ok(body)
}

/// Pulls a token pair out of a success body.
///
/// `fallback_refresh` is kept when the server does not rotate the refresh
/// token.
fn issued(
    op: Op,
    body: &AuthResponse,
    fallback_refresh: Option<&str>,
    now: Instant,
) -> Result<Issued, ErrorRecord> {
    let malformed = |what: &str| {
        ErrorRecord::new(
            op.malformed_code(),
            format!("{op} response has no {what}"),
            ErrorCategory::Protocol,
        )
    };

    let access = body
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| malformed("access token"))?;
    let refresh = body
        .refresh_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(fallback_refresh)
        .ok_or_else(|| malformed("refresh token"))?;
    let lifetime = body
        .expires_in
        .and_then(|secs| u64::try_from(secs).ok())
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs).min(MAX_TOKEN_LIFETIME))
        .ok_or_else(|| {
            ErrorRecord::new(
                codes::INVALID_TOKEN_LIFETIME,
                format!("{op} response has no positive expires_in"),
                ErrorCategory::Protocol,
            )
        })?;

    Ok(Issued {
        tokens: TokenSet::issued(access, refresh, lifetime, now),
        lifetime,
    })
}

fn identity_from_payload(payload: &UserPayload) -> UserIdentity {
    UserIdentity {
        id: payload.id.clone(),
        email: payload.email.clone(),
        username: payload.username.clone(),
        created_at: payload
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)),
    }
}

fn registered_identity(body: &AuthResponse, email: &str, username: &str) -> UserIdentity {
    let mut user = body
        .user
        .as_ref()
        .map(identity_from_payload)
        .unwrap_or_default();
    if user.id.is_empty() {
        user.id = body.user_id.clone().unwrap_or_default();
    }
    if user.email.is_empty() {
        user.email = email.to_owned();
    }
    if user.username.is_empty() {
        user.username = username.to_owned();
    }
    user
}

fn busy() -> ErrorRecord {
    ErrorRecord::new(
        codes::OPERATION_IN_PROGRESS,
        "Another auth operation is in progress",
        ErrorCategory::Auth,
    )
}

fn superseded(op: Op) -> ErrorRecord {
    ErrorRecord::info(
        codes::SUPERSEDED,
        format!("{op} was superseded by logout"),
        ErrorCategory::Auth,
    )
}
