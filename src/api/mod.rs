//! HTTP API module: the resource routes plus health, status and metrics.

pub mod handlers;
pub mod routes;

pub use handlers::{hello_world, list_resources, AppState};
pub use routes::{create_app, create_router, ops_router};
