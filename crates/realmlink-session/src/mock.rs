//! An in-memory auth backend for offline play, demos, and tests.
//!
//! [`MockAuthBackend`] is an [`HttpTransport`] that answers the four auth
//! endpoints itself. Plug it into an [`AuthSession`](crate::AuthSession)
//! in place of a real HTTP client; nothing else changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use realmlink_protocol::{LoginRequest, RefreshRequest, RegisterRequest};
use realmlink_transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Token lifetime handed out unless changed with
/// [`MockAuthBackend::set_token_lifetime`].
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone)]
struct MockUser {
    id: String,
    email: String,
    username: String,
    password: String,
    created_at: String,
}

#[derive(Debug)]
struct MockState {
    users: HashMap<String, MockUser>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    next_token: u64,
    next_user_id: u64,
    token_lifetime: i64,
    latency: Duration,
    offline: bool,
    requests: Vec<HttpRequest>,
}

/// Fake auth server. Clones share state, so a test can keep a handle to
/// inspect requests or change behavior while a session uses another.
#[derive(Debug, Clone)]
pub struct MockAuthBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthBackend {
    /// A backend that knows one account: `test@test.com` / `password`.
    pub fn new() -> Self {
        let backend = Self::empty();
        backend.add_user("test@test.com", "TestUser", "password");
        backend
    }

    /// A backend with no accounts.
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                users: HashMap::new(),
                access_tokens: HashMap::new(),
                refresh_tokens: HashMap::new(),
                next_token: 1,
                next_user_id: 12345,
                token_lifetime: DEFAULT_TOKEN_LIFETIME_SECS,
                latency: Duration::ZERO,
                offline: false,
                requests: Vec::new(),
            })),
        }
    }

    /// Adds an account and returns its id.
    pub fn add_user(&self, email: &str, username: &str, password: &str) -> String {
        let mut st = self.state.lock();
        let id = st.next_user_id.to_string();
        st.next_user_id += 1;
        st.users.insert(
            email.to_lowercase(),
            MockUser {
                id: id.clone(),
                email: email.to_owned(),
                username: username.to_owned(),
                password: password.to_owned(),
                created_at: Utc::now().to_rfc3339(),
            },
        );
        id
    }

    /// `expires_in` for tokens issued from now on. Zero or negative values
    /// are sent as-is.
    pub fn set_token_lifetime(&self, secs: i64) {
        self.state.lock().token_lifetime = secs;
    }

    /// Delay before every response.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// While offline every request fails at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Forgets every refresh token, so the next refresh gets a 401.
    pub fn revoke_refresh_tokens(&self) {
        self.state.lock().refresh_tokens.clear();
    }

    /// Every request received, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    /// How many requests hit the endpoint ending in `/{name}`.
    pub fn request_count(&self, name: &str) -> usize {
        let suffix = format!("/{name}");
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.url.ends_with(&suffix))
            .count()
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if request.method != Method::Post {
            return error(405, "Method not allowed");
        }
        let Some(endpoint) = request.url.rsplit('/').next() else {
            return error(404, "Not found");
        };
        let body = request.body.as_deref().unwrap_or_default();

        match endpoint {
            "login" => match parse::<LoginRequest>(body) {
                Some(req) => self.login(&req),
                None => error(400, "Invalid request body"),
            },
            "register" => match parse::<RegisterRequest>(body) {
                Some(req) => self.register(&req),
                None => error(400, "Invalid request body"),
            },
            "refresh" => match parse::<RefreshRequest>(body) {
                Some(req) => self.refresh(&req),
                None => error(400, "Invalid request body"),
            },
            "logout" => self.logout(request.header_value("Authorization")),
            _ => error(404, "Not found"),
        }
    }

    fn login(&self, req: &LoginRequest) -> HttpResponse {
        let mut st = self.state.lock();
        let user = match st.users.get(&req.email.to_lowercase()) {
            Some(user) if user.password == req.password => user.clone(),
            _ => return error(401, "Invalid email or password"),
        };
        issue(&mut st, &user)
    }

    fn register(&self, req: &RegisterRequest) -> HttpResponse {
        let key = req.email.to_lowercase();
        if self.state.lock().users.contains_key(&key) {
            return error(409, "Email already registered");
        }
        let id = self.add_user(&req.email, &req.username, &req.password);
        HttpResponse::new(
            201,
            json!({
                "success": true,
                "message": "User registered successfully",
                "user": { "id": id, "email": req.email, "username": req.username },
            })
            .to_string(),
        )
    }

    fn refresh(&self, req: &RefreshRequest) -> HttpResponse {
        let mut st = self.state.lock();
        let Some(email) = st.refresh_tokens.remove(&req.refresh_token) else {
            return error(401, "Invalid refresh token");
        };
        let Some(user) = st.users.get(&email).cloned() else {
            return error(401, "Invalid refresh token");
        };
        issue(&mut st, &user)
    }

    fn logout(&self, authorization: Option<&str>) -> HttpResponse {
        let mut st = self.state.lock();
        let token = authorization.and_then(|h| h.strip_prefix("Bearer "));
        let Some(email) = token.and_then(|t| st.access_tokens.remove(t)) else {
            return error(401, "Not authenticated");
        };
        st.refresh_tokens.retain(|_, owner| *owner != email);
        HttpResponse::new(200, json!({ "message": "Logged out" }).to_string())
    }
}

impl HttpTransport for MockAuthBackend {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (latency, offline) = {
            let mut st = self.state.lock();
            st.requests.push(request.clone());
            (st.latency, st.offline)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(TransportError::ConnectFailed("mock backend is offline".into()));
        }
        Ok(self.handle(&request))
    }
}

fn issue(st: &mut MockState, user: &MockUser) -> HttpResponse {
    let n = st.next_token;
    st.next_token += 1;
    let access = format!("mock_access_{n}");
    let refresh = format!("mock_refresh_{n}");
    let key = user.email.to_lowercase();
    st.access_tokens.insert(access.clone(), key.clone());
    st.refresh_tokens.insert(refresh.clone(), key);

    HttpResponse::new(
        200,
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": st.token_lifetime,
            "user": {
                "id": user.id,
                "email": user.email,
                "username": user.username,
                "created_at": user.created_at,
            },
        })
        .to_string(),
    )
}

fn parse<T: DeserializeOwned>(body: &str) -> Option<T> {
    serde_json::from_str(body).ok()
}

fn error(status: u16, message: &str) -> HttpResponse {
    let body: Value = json!({ "error_message": message });
    HttpResponse::new(status, body.to_string())
}
