//! Integration tests for the auth session, driven against the in-memory
//! backend on a paused clock.

use std::time::Duration;

use realmlink_protocol::{ErrorCategory, ErrorReporter, codes};
use realmlink_session::{
    AuthConfig, AuthEvent, AuthSession, Credentials, KeyValueStore, MAX_TOKEN_LIFETIME, MemoryStore,
    MockAuthBackend, Registration, SAVE_KEY, SAVE_SECTION, SessionState,
};
use tokio::sync::broadcast;

// =========================================================================
// Helpers
// =========================================================================

type Session = AuthSession<MockAuthBackend, MemoryStore>;

fn session_over(mock: &MockAuthBackend, kv: &MemoryStore) -> Session {
    AuthSession::new(
        AuthConfig::default(),
        mock.clone(),
        kv.clone(),
        ErrorReporter::new(),
    )
}

fn setup() -> (Session, MockAuthBackend, MemoryStore) {
    let mock = MockAuthBackend::new();
    let kv = MemoryStore::new();
    (session_over(&mock, &kv), mock, kv)
}

fn test_user() -> Credentials {
    Credentials::new("test@test.com", "password")
}

/// Lets spawned tasks (timers, the refresh worker) catch up.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn drain(rx: &mut broadcast::Receiver<AuthEvent>) -> Vec<AuthEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn saved_record(kv: &MemoryStore) -> String {
    kv.get(SAVE_SECTION, SAVE_KEY).unwrap().unwrap_or_default()
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_success_logs_in_and_arms_refresh() {
    let (session, mock, _kv) = setup();
    let mut events = session.subscribe();

    let result = session.login(test_user()).await.unwrap();
    settle().await;

    assert_eq!(result.user.username, "TestUser");
    assert_eq!(result.user.id, "12345");
    assert_eq!(session.session_state(), SessionState::LoggedIn);
    assert!(session.is_logged_in());
    assert_eq!(session.access_token(), "mock_access_1");
    assert_eq!(session.current_user().unwrap().email, "test@test.com");
    assert_eq!(session.refresh_timer_delay(), Some(Duration::from_secs(3540)));

    let events = drain(&mut events);
    assert!(matches!(events.as_slice(), [AuthEvent::LoginSucceeded(r)] if r.user.username == "TestUser"));

    let request = &mock.requests()[0];
    assert_eq!(request.url, "http://localhost:8080/api/v1/auth/login");
    assert_eq!(request.header_value("content-type"), Some("application/json"));
    assert_eq!(request.header_value("X-API-Version"), Some("v1"));
}

#[tokio::test(start_paused = true)]
async fn test_login_empty_password_fails_without_request() {
    let (session, mock, _kv) = setup();
    let mut events = session.subscribe();

    let err = session
        .login(Credentials::new("test@test.com", ""))
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::INVALID_INPUT);
    assert_eq!(err.category, ErrorCategory::Auth);
    assert_eq!(session.session_state(), SessionState::LoggedOut);
    assert!(session.tokens().is_none());
    assert!(mock.requests().is_empty());
    assert_eq!(session.errors().last().unwrap().code, codes::INVALID_INPUT);
    assert!(matches!(drain(&mut events).as_slice(), [AuthEvent::LoginFailed(e)] if e.code == codes::INVALID_INPUT));
}

#[tokio::test(start_paused = true)]
async fn test_login_wrong_password_is_invalid_credentials() {
    let (session, _mock, _kv) = setup();

    let err = session
        .login(Credentials::new("test@test.com", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::INVALID_CREDENTIALS);
    assert_eq!(err.message, "Invalid email or password");
    assert_eq!(session.session_state(), SessionState::LoggedOut);
    assert!(!session.is_logged_in());
    assert_eq!(session.refresh_timer_delay(), None);
}

#[tokio::test(start_paused = true)]
async fn test_login_zero_lifetime_is_protocol_error() {
    let (session, mock, _kv) = setup();
    mock.set_token_lifetime(0);

    let err = session.login(test_user()).await.unwrap_err();

    assert_eq!(err.code, codes::INVALID_TOKEN_LIFETIME);
    assert_eq!(err.category, ErrorCategory::Protocol);
    assert_eq!(session.session_state(), SessionState::LoggedOut);
    assert!(session.tokens().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_login_short_lifetime_refresh_floors_at_one_second() {
    let (session, mock, _kv) = setup();
    mock.set_token_lifetime(30);

    session.login(test_user()).await.unwrap();
    settle().await;

    assert_eq!(session.refresh_timer_delay(), Some(Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn test_login_with_huge_lifetime_caps_expiry() {
    let (session, mock, _kv) = setup();
    mock.set_token_lifetime(i64::MAX);

    let result = session.login(test_user()).await.unwrap();
    settle().await;

    assert!(session.is_logged_in());
    assert_eq!(result.tokens.access_token, session.tokens().unwrap().access_token);
    assert!(session.tokens().unwrap().expires_at.is_some());
    assert_eq!(
        session.refresh_timer_delay(),
        Some(MAX_TOKEN_LIFETIME - Duration::from_secs(60))
    );
}

#[tokio::test(start_paused = true)]
async fn test_login_while_in_flight_is_rejected() {
    let (session, mock, _kv) = setup();
    mock.set_latency(Duration::from_secs(1));

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.login(test_user()).await }
    });
    settle().await;
    assert_eq!(session.session_state(), SessionState::LoggingIn);

    let err = session.login(test_user()).await.unwrap_err();
    assert_eq!(err.code, codes::OPERATION_IN_PROGRESS);
    assert_eq!(session.session_state(), SessionState::LoggingIn);

    first.await.unwrap().unwrap();
    assert_eq!(session.session_state(), SessionState::LoggedIn);
    assert_eq!(mock.request_count("login"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_login_supersedes_it() {
    let (session, mock, _kv) = setup();
    mock.set_latency(Duration::from_secs(1));

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.login(test_user()).await }
    });
    settle().await;

    session.logout().await;
    let err = pending.await.unwrap().unwrap_err();

    assert_eq!(err.code, codes::SUPERSEDED);
    assert_eq!(session.session_state(), SessionState::LoggedOut);
    assert!(session.tokens().is_none());
    assert_eq!(session.refresh_timer_delay(), None);
}

#[tokio::test(start_paused = true)]
async fn test_login_again_replaces_session() {
    let (session, _mock, _kv) = setup();
    let mut events = session.subscribe();

    session.login(test_user()).await.unwrap();
    session.login(test_user()).await.unwrap();

    assert_eq!(session.access_token(), "mock_access_2");
    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, AuthEvent::LoginSucceeded(_))));
}

// =========================================================================
// Refresh
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduled_refresh_rotates_tokens() {
    let (session, mock, _kv) = setup();
    session.login(test_user()).await.unwrap();
    let mut events = session.subscribe();

    tokio::time::sleep(Duration::from_secs(3541)).await;
    settle().await;

    assert_eq!(mock.request_count("refresh"), 1);
    assert_eq!(session.access_token(), "mock_access_2");
    assert_eq!(session.session_state(), SessionState::LoggedIn);
    assert_eq!(session.current_user().unwrap().username, "TestUser");
    assert_eq!(session.refresh_timer_delay(), Some(Duration::from_secs(3540)));
    assert!(matches!(drain(&mut events).as_slice(), [AuthEvent::TokenRefreshed(t)] if t.access_token == "mock_access_2"));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_rejected_tears_down_session() {
    let (session, mock, kv) = setup();
    session.set_remember_me(true);
    session.login(test_user()).await.unwrap();
    assert!(saved_record(&kv).contains("mock_refresh_1"));

    mock.revoke_refresh_tokens();
    let mut events = session.subscribe();
    let err = session.refresh_token().await.unwrap_err();
    settle().await;

    assert_eq!(err.code, codes::REFRESH_REJECTED);
    assert_eq!(session.session_state(), SessionState::LoggedOut);
    assert!(session.tokens().is_none());
    assert!(session.current_user().is_none());
    assert_eq!(saved_record(&kv), "");
    assert_eq!(session.refresh_timer_delay(), None);
    assert!(matches!(drain(&mut events).as_slice(), [AuthEvent::SessionTerminated(e)] if e.code == codes::REFRESH_REJECTED));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_when_logged_out_is_not_logged_in() {
    let (session, mock, _kv) = setup();
    let mut events = session.subscribe();

    let err = session.refresh_token().await.unwrap_err();

    assert_eq!(err.code, codes::NOT_LOGGED_IN);
    assert!(mock.requests().is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_rearms_timer() {
    let (session, _mock, _kv) = setup();
    session.login(test_user()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1000)).await;
    let tokens = session.refresh_token().await.unwrap();
    settle().await;

    assert_eq!(tokens.access_token, "mock_access_2");
    assert_eq!(tokens.refresh_token, "mock_refresh_2");
    assert_eq!(session.refresh_timer_delay(), Some(Duration::from_secs(3540)));
}

// =========================================================================
// Logout
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_twice_offline_completes_both_times() {
    let (session, mock, kv) = setup();
    session.set_remember_me(true);
    session.login(test_user()).await.unwrap();
    mock.set_offline(true);
    let mut events = session.subscribe();

    session.logout().await;
    session.logout().await;

    assert_eq!(session.session_state(), SessionState::LoggedOut);
    assert!(!session.is_logged_in());
    assert_eq!(saved_record(&kv), "");
    // Only the first logout had a token to send.
    assert_eq!(mock.request_count("logout"), 1);
    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, AuthEvent::LogoutCompleted)));
}

#[tokio::test(start_paused = true)]
async fn test_logout_sends_bearer_token() {
    let (session, mock, _kv) = setup();
    session.login(test_user()).await.unwrap();

    session.logout().await;

    let logout = mock
        .requests()
        .into_iter()
        .find(|r| r.url.ends_with("/logout"))
        .unwrap();
    assert_eq!(logout.header_value("Authorization"), Some("Bearer mock_access_1"));
    assert_eq!(session.refresh_timer_delay(), None);
}

// =========================================================================
// Remember me / auto-login
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_auto_login_restores_saved_session() {
    let mock = MockAuthBackend::new();
    let kv = MemoryStore::new();

    let first = session_over(&mock, &kv);
    first.set_remember_me(true);
    first.login(test_user()).await.unwrap();
    let raw = saved_record(&kv);
    assert!(raw.contains("mock_refresh_1"));
    assert!(!raw.contains("mock_access_1"));
    drop(first);

    let second = session_over(&mock, &kv);
    let mut events = second.subscribe();
    let result = second.try_auto_login().await.unwrap();

    assert_eq!(result.user.username, "TestUser");
    assert!(second.is_logged_in());
    assert!(second.remember_me());
    assert!(saved_record(&kv).contains("mock_refresh_2"));
    assert!(matches!(drain(&mut events).as_slice(), [AuthEvent::LoginSucceeded(_)]));
}

#[tokio::test(start_paused = true)]
async fn test_auto_login_without_saved_session() {
    let (session, mock, _kv) = setup();
    let mut events = session.subscribe();

    let err = session.try_auto_login().await.unwrap_err();

    assert_eq!(err.code, codes::NO_SAVED_CREDENTIALS);
    assert!(mock.requests().is_empty());
    assert!(matches!(drain(&mut events).as_slice(), [AuthEvent::LoginFailed(_)]));
}

#[tokio::test(start_paused = true)]
async fn test_auto_login_offline_keeps_saved_session() {
    let (session, mock, kv) = setup();
    session.set_remember_me(true);
    session.login(test_user()).await.unwrap();
    let fresh = session_over(&mock, &kv);
    mock.set_offline(true);

    let err = fresh.try_auto_login().await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::Network);
    assert_eq!(fresh.session_state(), SessionState::LoggedOut);
    assert!(saved_record(&kv).contains("mock_refresh_1"));
}

#[tokio::test(start_paused = true)]
async fn test_auto_login_rejected_clears_saved_session() {
    let (session, mock, kv) = setup();
    session.set_remember_me(true);
    session.login(test_user()).await.unwrap();
    let fresh = session_over(&mock, &kv);
    mock.revoke_refresh_tokens();

    let err = fresh.try_auto_login().await.unwrap_err();

    assert_eq!(err.code, codes::REFRESH_REJECTED);
    assert_eq!(saved_record(&kv), "");
}

#[tokio::test(start_paused = true)]
async fn test_set_remember_me_off_empties_record_while_logged_in() {
    let (session, _mock, kv) = setup();
    session.set_remember_me(true);
    session.login(test_user()).await.unwrap();
    let flushes = kv.flush_count();

    session.set_remember_me(false);

    assert_eq!(saved_record(&kv), "");
    assert_eq!(kv.flush_count(), flushes + 1);
}

// =========================================================================
// Registration
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_register_creates_account_without_logging_in() {
    let (session, _mock, _kv) = setup();
    let mut events = session.subscribe();

    let user = session
        .register(Registration::new("new@test.com", "NewUser", "Secret123"))
        .await
        .unwrap();

    assert_eq!(user.username, "NewUser");
    assert!(!user.id.is_empty());
    assert_eq!(session.session_state(), SessionState::LoggedOut);
    assert!(matches!(drain(&mut events).as_slice(), [AuthEvent::RegisterSucceeded(_)]));

    session
        .login(Credentials::new("new@test.com", "Secret123"))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_register_duplicate_email_already_exists() {
    let (session, _mock, _kv) = setup();
    let mut events = session.subscribe();

    let err = session
        .register(Registration::new("test@test.com", "Another", "pw"))
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::ALREADY_EXISTS);
    assert_eq!(err.message, "Email already registered");
    assert!(matches!(drain(&mut events).as_slice(), [AuthEvent::RegisterFailed(_)]));
}

#[tokio::test(start_paused = true)]
async fn test_register_bad_username_fails_locally() {
    let (session, mock, _kv) = setup();

    let err = session
        .register(Registration::new("new@test.com", "no spaces", "pw"))
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::INVALID_INPUT);
    assert!(mock.requests().is_empty());
}
