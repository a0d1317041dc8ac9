//! `GameClient` builder and composition root.
//!
//! This is the entry point for a game that wants to be online. It ties
//! together all the layers: transport → protocol → session → connection,
//! and keeps the world socket's bearer token in step with the auth session.

use realmlink_connection::{ConnectionError, ConnectionManager, ConnectionState};
use realmlink_protocol::{ErrorRecord, ErrorReporter};
use realmlink_session::{
    AuthEvent, AuthSession, Credentials, JsonFileStore, KeyValueStore, LoginResult,
    Registration, UserIdentity,
};
use realmlink_transport::{
    CLOSE_NORMAL, HttpTransport, ReqwestTransport, SocketTransport, WebSocketTransport,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ClientConfig, RealmlinkError};

/// Close reason sent when a logout takes the world connection down.
pub const LOGOUT_REASON: &str = "Logged out";

/// Builder for configuring a [`GameClient`].
///
/// # Example
///
/// ```rust,ignore
/// use realmlink::prelude::*;
///
/// let client = GameClient::builder()
///     .backend_url("https://realm.example")
///     .websocket_url("wss://realm.example/ws")
///     .build_production()?;
/// client.login(Credentials::new("me@realm.example", "secret")).await?;
/// client.connect_world().await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct GameClientBuilder {
    config: ClientConfig,
}

impl GameClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend_url(mut self, url: &str) -> Self {
        self.config.backend_url = url.to_string();
        self
    }

    pub fn websocket_url(mut self, url: &str) -> Self {
        self.config.websocket_url = url.to_string();
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Builds a client over caller-supplied transports and store.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build<H, T, S>(self, http: H, socket: T, store: S) -> GameClient<H, T, S>
    where
        H: HttpTransport,
        T: SocketTransport,
        S: KeyValueStore,
    {
        GameClient::new(self.config, http, socket, store)
    }

    /// Builds a client over reqwest, tokio-tungstenite, and a JSON save file.
    pub fn build_production(
        self,
    ) -> Result<GameClient<ReqwestTransport, WebSocketTransport, JsonFileStore>, RealmlinkError>
    {
        let config = self.config.validated();
        let http = ReqwestTransport::new(config.request_timeout())?;
        let store = JsonFileStore::open(config.save_path())?;
        Ok(GameClient::new(config, http, WebSocketTransport::new(), store))
    }
}

/// One player's online presence: an auth session plus a world connection.
///
/// Both halves report into the same [`ErrorReporter`]. A background task
/// follows [`AuthEvent`]s so that the connection always presents the
/// current access token, and a logout or a terminated session closes the
/// world connection.
pub struct GameClient<H: HttpTransport, T: SocketTransport, S: KeyValueStore> {
    config: ClientConfig,
    auth: AuthSession<H, S>,
    connection: ConnectionManager<T>,
    errors: ErrorReporter,
    forwarder: JoinHandle<()>,
}

impl GameClient<ReqwestTransport, WebSocketTransport, JsonFileStore> {
    /// Production client for `config`. See [`GameClientBuilder::build_production`].
    pub fn production(config: ClientConfig) -> Result<Self, RealmlinkError> {
        GameClientBuilder::new().config(config).build_production()
    }
}

impl<H: HttpTransport, T: SocketTransport, S: KeyValueStore> GameClient<H, T, S> {
    pub fn builder() -> GameClientBuilder {
        GameClientBuilder::new()
    }

    /// Must be called inside a Tokio runtime.
    pub fn new(config: ClientConfig, http: H, socket: T, store: S) -> Self {
        let config = config.validated();
        let errors = ErrorReporter::new();
        let auth = AuthSession::new(config.auth_config(), http, store, errors.clone());
        let connection =
            ConnectionManager::new(config.connection_config(), socket, errors.clone());
        let forwarder = tokio::spawn(forward_auth_events(auth.clone(), connection.clone()));

        Self {
            config,
            auth,
            connection,
            errors,
            forwarder,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthSession<H, S> {
        &self.auth
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }

    // -- Auth ---------------------------------------------------------------

    pub async fn login(&self, credentials: Credentials) -> Result<LoginResult, ErrorRecord> {
        let result = self.auth.login(credentials).await?;
        self.connection
            .set_auth_token(Some(result.tokens.access_token.clone()));
        Ok(result)
    }

    pub async fn register(&self, registration: Registration) -> Result<UserIdentity, ErrorRecord> {
        self.auth.register(registration).await
    }

    pub async fn try_auto_login(&self) -> Result<LoginResult, ErrorRecord> {
        let result = self.auth.try_auto_login().await?;
        self.connection
            .set_auth_token(Some(result.tokens.access_token.clone()));
        Ok(result)
    }

    /// Logs out and closes the world connection with a normal close.
    pub async fn logout(&self) {
        self.auth.logout().await;
        drop_world(&self.connection);
    }

    // -- World connection ---------------------------------------------------

    /// Opens the world socket at the configured URL with the current
    /// access token, if any.
    pub async fn connect_world(&self) -> Result<(), ConnectionError> {
        self.connection
            .set_auth_token(Some(self.auth.access_token()));
        self.connection
            .connect(self.config.websocket_url.clone(), Vec::new())
            .await
    }

    pub fn disconnect_world(&self, code: u16, reason: &str) {
        self.connection.disconnect(code, reason);
    }

    pub fn send_message(&self, text: impl Into<String>) -> bool {
        self.connection.send_message(text)
    }
}

impl<H: HttpTransport, T: SocketTransport, S: KeyValueStore> Drop for GameClient<H, T, S> {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Clears the bearer token and closes the socket if one is up.
fn drop_world<T: SocketTransport>(connection: &ConnectionManager<T>) {
    connection.set_auth_token(None);
    if matches!(
        connection.connection_state(),
        ConnectionState::Connected | ConnectionState::Connecting
    ) {
        connection.disconnect(CLOSE_NORMAL, LOGOUT_REASON);
    }
}

async fn forward_auth_events<H, T, S>(auth: AuthSession<H, S>, connection: ConnectionManager<T>)
where
    H: HttpTransport,
    T: SocketTransport,
    S: KeyValueStore,
{
    let mut events = auth.subscribe();
    loop {
        match events.recv().await {
            Ok(AuthEvent::LoginSucceeded(result)) => {
                connection.set_auth_token(Some(result.tokens.access_token));
            }
            Ok(AuthEvent::TokenRefreshed(tokens)) => {
                debug!("access token rotated");
                connection.set_auth_token(Some(tokens.access_token));
            }
            Ok(AuthEvent::LogoutCompleted) => drop_world(&connection),
            Ok(AuthEvent::SessionTerminated(record)) => {
                info!(code = record.code, "session ended, closing world connection");
                drop_world(&connection);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "auth events lagged, resyncing token");
                connection.set_auth_token(Some(auth.access_token()));
            }
            Err(RecvError::Closed) => break,
        }
    }
}
