//! In-process mock backend
//!
//! Serves the same `/api/auth/*` and `/api/chat*` endpoints as the real
//! backend over in-memory state on an ephemeral localhost port. Callers are
//! identified by their bearer token; there is no global "current user".

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::types::{
    ChatRequest, Credentials, HistoryResponse, LoginResponse, Message, RefreshRequest,
    RefreshResponse, RegisterResponse, iso_timestamp,
};

const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

const CANNED_REPLIES: &[&str] = &[
    "That's an interesting question! Based on my analysis, I would suggest considering multiple perspectives before making a decision.",
    "I understand what you're asking. Let me break this down for you step by step to make it clearer.",
    "Great question! Here's what I think: the key to solving this lies in understanding the fundamental principles involved.",
    "I'd be happy to help with that! From my perspective, there are several approaches you could take.",
    "That's a thought-provoking topic. Let me share some insights that might be helpful for your situation.",
];

// ============================================
// State
// ============================================

struct MockUser {
    id: String,
    email: String,
    password: String,
}

#[derive(Default)]
struct MockDb {
    users: HashMap<String, MockUser>,
    /// access token -> (user id, expiry)
    access_tokens: HashMap<String, (String, Instant)>,
    /// refresh token -> (user id, access token issued with it)
    refresh_tokens: HashMap<String, (String, String)>,
    messages: HashMap<String, Vec<Message>>,
}

impl MockDb {
    fn issue_tokens(&mut self, user_id: &str) -> RefreshResponse {
        let now = Instant::now();
        self.access_tokens.retain(|_, (_, expires_at)| now < *expires_at);

        let access_token = format!("mock-at-{}", uuid::Uuid::new_v4().simple());
        let refresh_token = format!("mock-rt-{}", uuid::Uuid::new_v4().simple());
        self.access_tokens.insert(
            access_token.clone(),
            (user_id.to_string(), now + ACCESS_TOKEN_TTL),
        );
        self.refresh_tokens.insert(
            refresh_token.clone(),
            (user_id.to_string(), access_token.clone()),
        );
        RefreshResponse {
            access_token,
            refresh_token,
        }
    }

    /// Trade a refresh token for a new pair. The presented refresh token and
    /// the access token issued with it stop working.
    fn rotate(&mut self, refresh_token: &str) -> Option<RefreshResponse> {
        let (user_id, access_token) = self.refresh_tokens.remove(refresh_token)?;
        self.access_tokens.remove(&access_token);
        Some(self.issue_tokens(&user_id))
    }

    fn user_for_token(&self, token: &str) -> Option<String> {
        let (user_id, expires_at) = self.access_tokens.get(token)?;
        (Instant::now() < *expires_at).then(|| user_id.clone())
    }
}

#[derive(Default)]
struct MockState {
    db: Mutex<MockDb>,
    hits: Mutex<HashMap<String, usize>>,
    last_authorization: Mutex<HashMap<String, String>>,
    latency: Duration,
}

impl MockState {
    fn db(&self) -> std::sync::MutexGuard<'_, MockDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type SharedState = Arc<MockState>;

/// Error body in the backend's `{"message": ...}` shape.
struct MockError(StatusCode, &'static str);

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1 }))).into_response()
    }
}

type MockResult<T> = Result<Json<T>, MockError>;

// ============================================
// Server
// ============================================

/// A running mock backend. The server stops when this is dropped.
pub struct MockServer {
    addr: SocketAddr,
    state: SharedState,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with_latency(Duration::ZERO).await
    }

    /// Start a server that delays every request by `latency`.
    pub async fn start_with_latency(latency: Duration) -> std::io::Result<Self> {
        let state = Arc::new(MockState {
            latency,
            ..Default::default()
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(state.clone());

        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::warn!("mock backend stopped: {err}");
            }
        });
        tracing::info!(%addr, "mock backend listening");

        Ok(Self { addr, state, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Number of requests seen for `path` (relative to the base URL, e.g. `/chat`).
    pub fn hits(&self, path: &str) -> usize {
        let hits = self.state.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.get(path).copied().unwrap_or_default()
    }

    /// The `Authorization` header of the latest request to `path`.
    pub fn last_authorization(&self, path: &str) -> Option<String> {
        let seen = self
            .state
            .last_authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        seen.get(path).cloned()
    }

    /// Expire every issued access token so the next authenticated call gets a 401.
    pub fn expire_access_tokens(&self) {
        let now = Instant::now();
        for (_, expires_at) in self.state.db().access_tokens.values_mut() {
            *expires_at = now;
        }
    }

    /// Forget every issued refresh token so refreshes are rejected.
    pub fn revoke_refresh_tokens(&self) {
        self.state.db().refresh_tokens.clear();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/chat", post(send_message))
        .route("/api/chat/history", get(history).delete(clear_history))
        .layer(middleware::from_fn_with_state(state.clone(), record_hit))
        .with_state(state)
}

async fn record_hit(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let path = request
        .uri()
        .path()
        .trim_start_matches("/api")
        .to_string();
    *state
        .hits
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(path.clone())
        .or_default() += 1;
    if let Some(auth) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        state
            .last_authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, auth.to_string());
    }

    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }
    next.run(request).await
}

// ============================================
// Handlers
// ============================================

async fn register(
    State(state): State<SharedState>,
    Json(body): Json<Credentials>,
) -> MockResult<RegisterResponse> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(MockError(
            StatusCode::BAD_REQUEST,
            "Email and password are required",
        ));
    }

    let mut db = state.db();
    if db.users.values().any(|u| u.email == body.email) {
        return Err(MockError(StatusCode::BAD_REQUEST, "Email already registered"));
    }

    let user_id = uuid::Uuid::new_v4().to_string();
    db.users.insert(
        user_id.clone(),
        MockUser {
            id: user_id.clone(),
            email: body.email,
            password: body.password,
        },
    );
    db.messages.insert(user_id.clone(), Vec::new());

    Ok(Json(RegisterResponse {
        message: "Registration successful".into(),
        user_id,
    }))
}

async fn login(
    State(state): State<SharedState>,
    Json(body): Json<Credentials>,
) -> MockResult<LoginResponse> {
    let mut db = state.db();
    let user = db
        .users
        .values()
        .find(|u| u.email == body.email && u.password == body.password)
        .map(|u| (u.id.clone(), u.email.clone()));
    let Some((user_id, email)) = user else {
        return Err(MockError(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    };

    let tokens = db.issue_tokens(&user_id);
    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user_id,
        email,
    }))
}

async fn refresh(
    State(state): State<SharedState>,
    Json(body): Json<RefreshRequest>,
) -> MockResult<RefreshResponse> {
    state
        .db()
        .rotate(&body.refresh_token)
        .map(Json)
        .ok_or(MockError(StatusCode::UNAUTHORIZED, "Invalid refresh token"))
}

fn authenticate(state: &MockState, headers: &HeaderMap) -> Result<String, MockError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.db().user_for_token(token))
        .ok_or(MockError(StatusCode::UNAUTHORIZED, "Not authenticated"))
}

async fn send_message(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> MockResult<Message> {
    let user_id = authenticate(&state, &headers)?;

    let mut db = state.db();
    let messages = db.messages.entry(user_id).or_default();
    let message = Message {
        id: uuid::Uuid::new_v4().to_string(),
        prompt: body.prompt,
        response: CANNED_REPLIES[messages.len() % CANNED_REPLIES.len()].to_string(),
        timestamp: iso_timestamp(time::OffsetDateTime::now_utc()),
    };
    messages.push(message.clone());

    Ok(Json(message))
}

async fn history(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> MockResult<HistoryResponse> {
    let user_id = authenticate(&state, &headers)?;
    let messages = state
        .db()
        .messages
        .get(&user_id)
        .cloned()
        .unwrap_or_default();
    Ok(Json(HistoryResponse { messages }))
}

async fn clear_history(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<StatusCode, MockError> {
    let user_id = authenticate(&state, &headers)?;
    state.db().messages.remove(&user_id);
    Ok(StatusCode::NO_CONTENT)
}
