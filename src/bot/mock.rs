//! Mock bot OpenAPI server for testing.
//!
//! Serves the handful of REST endpoints the bot uses on a local port so
//! the real [`OpenApiClient`] can be exercised without the platform.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::openapi::OpenApiClient;
use crate::config::BotConfig;
use crate::error::ApiError;

/// A message body received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    /// Channel from the request path.
    pub channel_id: String,
    /// `content` field of the body.
    pub content: Option<String>,
    /// `msg_id` field of the body.
    pub msg_id: Option<String>,
    /// `Authorization` header sent by the client.
    pub authorization: Option<String>,
}

/// Configuration for mock server behavior.
#[derive(Debug, Clone, Default)]
pub struct MockApiConfig {
    /// URL returned by `GET /gateway/bot`.
    pub gateway_url: String,
    /// Whether to reject message posts with 403.
    pub fail_posts: bool,
}

#[derive(Clone)]
struct MockState {
    config: MockApiConfig,
    posted: Arc<Mutex<Vec<PostedMessage>>>,
}

/// Local HTTP server standing in for the bot OpenAPI.
pub struct MockApiServer {
    addr: SocketAddr,
    posted: Arc<Mutex<Vec<PostedMessage>>>,
    task: JoinHandle<()>,
}

impl MockApiServer {
    /// Bind an ephemeral port and start serving.
    pub async fn start(config: MockApiConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let posted = Arc::new(Mutex::new(Vec::new()));

        let state = MockState {
            config,
            posted: posted.clone(),
        };
        let app = Router::new()
            .route("/users/@me", get(me))
            .route("/gateway/bot", get(gateway_bot))
            .route("/channels/:channel_id/messages", post(post_message))
            .with_state(state);

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, posted, task })
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:40123`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A REST client pointed at this server.
    pub fn client(&self, config: &BotConfig) -> Result<OpenApiClient, ApiError> {
        OpenApiClient::with_base_url(config, &self.base_url(), Duration::from_secs(2))
    }

    /// Messages posted so far, oldest first.
    pub fn posted(&self) -> Vec<PostedMessage> {
        self.posted
            .lock()
            .map(|posted| posted.clone())
            .unwrap_or_default()
    }
}

impl Drop for MockApiServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn me() -> Json<Value> {
    Json(json!({"id": "9000", "username": "mock-bot", "bot": true}))
}

async fn gateway_bot(State(state): State<MockState>) -> Json<Value> {
    Json(json!({
        "url": state.config.gateway_url,
        "shards": 1,
        "session_start_limit": {"total": 1000, "remaining": 999, "reset_after": 0, "max_concurrency": 1}
    }))
}

async fn post_message(
    State(state): State<MockState>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if state.config.fail_posts {
        let body = json!({"code": 304003, "message": "no permission to send"});
        return (StatusCode::FORBIDDEN, Json(body)).into_response();
    }

    let message = PostedMessage {
        channel_id: channel_id.clone(),
        content: body["content"].as_str().map(str::to_string),
        msg_id: body["msg_id"].as_str().map(str::to_string),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    if let Ok(mut posted) = state.posted.lock() {
        posted.push(message);
    }

    Json(json!({
        "id": "reply-1",
        "channel_id": channel_id,
        "content": body["content"],
    }))
    .into_response()
}
