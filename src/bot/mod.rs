//! QQ guild bot client.
//!
//! This module handles:
//! - Intent names and the identify bitmask
//! - REST client for the bot OpenAPI
//! - Gateway session state machine and websocket driver
//! - Slash commands answered on mention, with an access list
//! - A local mock of the REST API for tests

pub mod commands;
pub mod gateway;
pub mod intents;
pub mod mock;
pub mod openapi;
pub mod session;
pub mod types;

use std::time::Duration;

pub use gateway::{GatewayClient, ReconnectConfig};
pub use intents::Intent;
pub use mock::{MockApiConfig, MockApiServer, PostedMessage};
pub use openapi::OpenApiClient;
pub use session::Session;
pub use types::{DispatchEvent, GatewayEvent, Message, MessageToCreate, User};

use crate::config::{BotConfig, Config};
use crate::error::ApiError;

/// Create a REST client for the bot. Makes no network calls.
pub fn create_openapi(config: &BotConfig) -> Result<OpenApiClient, ApiError> {
    OpenApiClient::new(config)
}

/// Create a gateway connection handle for the bot. The connection is opened
/// by [`GatewayClient::run_with_reconnect`].
pub fn create_websocket(config: &BotConfig) -> Result<GatewayClient, ApiError> {
    Ok(GatewayClient::new(config, create_openapi(config)?))
}

/// Build both handles using the tuning values from [`Config`].
pub fn create_handles(
    config: &Config,
    bot: &BotConfig,
) -> Result<(OpenApiClient, GatewayClient), ApiError> {
    let api = OpenApiClient::with_timeout(bot, Duration::from_millis(config.http_timeout_ms))?;
    let gateway = GatewayClient::with_reconnect_config(
        bot,
        api.clone(),
        ReconnectConfig::from_config(config.ws_max_reconnect_delay_s),
    );
    Ok((api, gateway))
}
