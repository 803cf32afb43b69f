//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Body of `GET /`.
pub const RESOURCE_BODY: &str = "respond with a resource";
/// Body of `GET /hello`.
pub const HELLO_BODY: &str = "Hello World!";

/// Resource listing placeholder.
pub async fn list_resources() -> &'static str {
    RESOURCE_BODY
}

/// Hello world responder. Mountable on any router or callable directly.
pub async fn hello_world() -> &'static str {
    HELLO_BODY
}

/// Gateway counters surfaced on `/status`.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Events received from the gateway.
    pub events_received: AtomicU64,
    /// Commands answered.
    pub commands_answered: AtomicU64,
    /// Connections lost.
    pub disconnects: AtomicU64,
}

/// Application state shared with the operations handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the gateway session is ready.
    pub ready: Arc<AtomicBool>,
    /// Current gateway session id.
    pub session_id: Arc<RwLock<Option<String>>>,
    /// Bot username from READY.
    pub bot_user: Arc<RwLock<Option<String>>>,
    /// Gateway counters.
    pub stats: Arc<GatewayStats>,
    /// Process start time.
    pub started_at: OffsetDateTime,
    /// Whether the bot was started at all.
    pub bot_enabled: bool,
    /// Prometheus render handle.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(bot_enabled: bool) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            session_id: Arc::new(RwLock::new(None)),
            bot_user: Arc::new(RwLock::new(None)),
            stats: Arc::new(GatewayStats::default()),
            started_at: OffsetDateTime::now_utc(),
            bot_enabled,
            metrics: None,
        }
    }

    /// Attach the Prometheus handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready. A server without a bot is always ready.
    pub fn is_ready(&self) -> bool {
        !self.bot_enabled || self.ready.load(Ordering::SeqCst)
    }

    /// Record a READY or RESUMED session.
    pub async fn session_ready(&self, session_id: Option<String>, user: Option<String>) {
        if let Some(id) = session_id {
            *self.session_id.write().await = Some(id);
        }
        if let Some(name) = user {
            *self.bot_user.write().await = Some(name);
        }
        self.set_ready(true);
    }

    /// Record a lost connection.
    pub fn session_lost(&self) {
        self.set_ready(false);
        self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ready", &self.ready)
            .field("started_at", &self.started_at)
            .field("bot_enabled", &self.bot_enabled)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
    /// Current gateway session id.
    pub session_id: Option<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Bot username.
    pub bot: Option<String>,
    /// Gateway session id.
    pub session_id: Option<String>,
    /// Start time, RFC 3339.
    pub started_at: String,
    /// Seconds since start.
    pub uptime_secs: i64,
    /// Statistics.
    pub stats: StatsResponse,
}

/// Statistics in status response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Events received.
    pub events_received: u64,
    /// Commands answered.
    pub commands_answered: u64,
    /// Connections lost.
    pub disconnects: u64,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let session_id = state.session_id.read().await.clone();

    let response = ReadyResponse {
        ready: is_ready,
        session_id,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns gateway status and statistics.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.session_id.read().await.clone();
    let bot = state.bot_user.read().await.clone();

    let status = match (state.bot_enabled, state.is_ready()) {
        (false, _) => "bot-disabled",
        (true, true) => "running",
        (true, false) => "connecting",
    };

    let now = OffsetDateTime::now_utc();
    Json(StatusResponse {
        status,
        bot,
        session_id,
        started_at: state.started_at.format(&Rfc3339).unwrap_or_default(),
        uptime_secs: (now - state.started_at).whole_seconds(),
        stats: StatsResponse {
            events_received: state.stats.events_received.load(Ordering::Relaxed),
            commands_answered: state.stats.commands_answered.load(Ordering::Relaxed),
            disconnects: state.stats.disconnects.load(Ordering::Relaxed),
        },
    })
}

/// Prometheus scrape handler - 404 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}
