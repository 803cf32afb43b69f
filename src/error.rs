//! Unified error types for the bot server.

use thiserror::Error;

/// Unified error type for the bot server.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// REST API error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment could not be deserialized.
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    /// A required value is missing or empty.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A value is present but malformed.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Environment variable name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Intent name not known to the platform.
    #[error("unknown intent: {0}")]
    UnknownIntent(String),
}

/// Bot REST API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    ClientBuild(String),

    /// Base URL could not be parsed or joined.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Request failed before a response arrived.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Platform answered with a non-success status.
    #[error("api returned {status}: code={code:?} message={message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Platform error code, when the body carried one.
        code: Option<i64>,
        /// Platform error message or raw body.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("failed to parse api response: {0}")]
    ParseError(String),
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// First frame was not a Hello.
    #[error("expected hello from gateway, got op {0}")]
    ExpectedHello(u8),

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Gateway URL lookup failed.
    #[error("gateway lookup failed: {0}")]
    Gateway(#[from] ApiError),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
