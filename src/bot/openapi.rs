//! Bot REST API client.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use super::types::{ApiErrorBody, GatewayBot, Message, MessageToCreate, User};
use crate::config::BotConfig;
use crate::error::ApiError;
use crate::metrics;

/// Production API host.
pub const API_URL: &str = "https://api.sgroup.qq.com";
/// Sandbox API host.
pub const SANDBOX_API_URL: &str = "https://sandbox.api.sgroup.qq.com";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bot REST API client.
#[derive(Debug, Clone)]
pub struct OpenApiClient {
    /// HTTP client with authorization baked into default headers.
    http: reqwest::Client,
    /// API base URL.
    base_url: Url,
    /// Whether the base URL is the sandbox host.
    sandbox: bool,
}

/// Base URL for the given environment.
pub fn api_base(sandbox: bool) -> &'static str {
    if sandbox {
        SANDBOX_API_URL
    } else {
        API_URL
    }
}

impl OpenApiClient {
    /// Create a client for the configured bot.
    pub fn new(config: &BotConfig) -> Result<Self, ApiError> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(config: &BotConfig, timeout: Duration) -> Result<Self, ApiError> {
        Self::with_base_url(config, api_base(config.sandbox), timeout)
    }

    /// Create a client against an explicit base URL.
    pub fn with_base_url(
        config: &BotConfig,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut auth = HeaderValue::from_str(&config.bot_token())
            .map_err(|e| ApiError::ClientBuild(format!("invalid token header: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(3))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            sandbox: config.sandbox,
        })
    }

    /// API base URL in use.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the client targets the sandbox.
    pub fn is_sandbox(&self) -> bool {
        self.sandbox
    }

    /// Resolve a path against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    /// Get the bot user.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<User, ApiError> {
        let url = self.endpoint("/users/@me")?;
        self.send(self.http.get(url), "me").await
    }

    /// Look up the gateway URL and shard recommendation.
    #[instrument(skip(self))]
    pub async fn gateway_bot(&self) -> Result<GatewayBot, ApiError> {
        let url = self.endpoint("/gateway/bot")?;
        self.send(self.http.get(url), "gateway_bot").await
    }

    /// Post a message to a channel.
    #[instrument(skip(self, message), fields(channel_id = %channel_id))]
    pub async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageToCreate,
    ) -> Result<Message, ApiError> {
        let url = self.endpoint(&format!("/channels/{}/messages", channel_id))?;
        self.send(self.http.post(url).json(message), "post_message")
            .await
    }

    /// Send a request and decode a JSON body, mapping failures to [`ApiError`].
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &'static str,
    ) -> Result<T, ApiError> {
        let start = Instant::now();
        metrics::inc_api_requests(endpoint);

        let result = async {
            let response = request.send().await?;
            let status = response.status();

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status.as_u16(), &body));
            }

            let text = response.text().await?;
            debug!(endpoint, bytes = text.len(), "API response");
            serde_json::from_str(&text).map_err(|e| ApiError::ParseError(e.to_string()))
        }
        .await;

        metrics::record_http_latency(start, endpoint);
        if let Err(e) = &result {
            metrics::inc_api_failures(endpoint);
            warn!(endpoint, error = %e, "API request failed");
        }
        result
    }
}

/// Build a status error, decoding the platform error body when possible.
pub fn status_error(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => ApiError::Status {
            status,
            code: parsed.code,
            message: parsed.message.unwrap_or_default(),
        },
        Err(_) => ApiError::Status {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}
