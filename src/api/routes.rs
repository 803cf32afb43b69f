//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{health, hello_world, list_resources, metrics, ready, status, AppState};

/// Create the resource router: `GET /` and `GET /hello`.
///
/// Unmatched paths fall through to axum's default 404.
pub fn create_router() -> Router {
    Router::new()
        .route("/", get(list_resources))
        .route("/hello", get(hello_world))
}

/// Create the operations router (health, readiness, status, metrics).
pub fn ops_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status and scrape endpoints
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Full application: resource and operations routes with request tracing and
/// permissive CORS.
pub fn create_app(state: AppState) -> Router {
    create_router()
        .merge(ops_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
