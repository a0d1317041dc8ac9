//! Walks a client through a full session against the in-memory backend:
//! register, log in, watch the events, try the world socket, log out.
//!
//! ```text
//! RUST_LOG=realmlink=debug cargo run -p session-smoke [config.toml]
//! ```
//!
//! The world socket is real. Without a server at `websocket_url` the
//! connect fails, which is reported and then tolerated.

use realmlink::prelude::*;
use realmlink::session::{MemoryStore, MockAuthBackend};
use realmlink::transport::WebSocketTransport;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), RealmlinkError> {
    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig {
            max_reconnect_attempts: 0,
            ..ClientConfig::default()
        },
    };
    realmlink::logging::init(&config.log_filter);

    let backend = MockAuthBackend::new();
    let client = GameClient::<MockAuthBackend, WebSocketTransport, MemoryStore>::builder().config(config).build(
        backend.clone(),
        WebSocketTransport::new(),
        MemoryStore::new(),
    );

    let mut auth_events = client.auth().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = auth_events.recv().await {
            info!(?event, "auth event");
        }
    });

    let user = client
        .register(Registration::new("smoke@realm.test", "smoke_test", "hunter22"))
        .await?;
    info!(id = %user.id, username = %user.username, "registered");

    client.auth().set_remember_me(true);
    let login = client
        .login(Credentials::new("smoke@realm.test", "hunter22"))
        .await?;
    info!(
        user = %login.user.username,
        refresh_in = ?client.auth().refresh_timer_delay(),
        "logged in"
    );

    let tokens = client.auth().refresh_token().await?;
    info!(expires_at = ?tokens.expires_at, "token refreshed by hand");

    // World socket
    match client.connect_world().await {
        Ok(()) => {
            client.send_message(r#"{"type":"hello"}"#);
            info!(state = %client.connection().connection_state(), "world connected");
        }
        Err(e) => warn!(error = %e, "world connection unavailable"),
    }

    client.logout().await;
    info!(
        state = %client.auth().session_state(),
        requests = backend.requests().len(),
        errors = client.errors().len(),
        "done"
    );
    Ok(())
}
