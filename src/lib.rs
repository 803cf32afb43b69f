//! HTTP service with a QQ guild bot attached.
//!
//! The service exposes a tiny resource router and, alongside it, keeps a bot
//! REST client and a gateway (websocket) session alive for the configured
//! application. The two halves share a process but not state: routes never
//! reach into the bot handles.
//!
//! ```text
//!  HTTP  ──► api::create_router()   GET /        "respond with a resource"
//!                                   GET /hello   "Hello World!"
//!
//!  Bot   ──► bot::create_openapi()   REST  (api.sgroup.qq.com)
//!        ──► bot::create_websocket() gateway session, heartbeats, resume
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`api`]: HTTP routes (resource router plus health/metrics)
//! - [`bot`]: Bot REST client, gateway session and commands
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod bot;
pub mod config;
pub mod error;
pub mod metrics;
pub mod utils;

pub use config::{BotConfig, Config};
pub use error::{BotError, Result};
