//! Application configuration loaded from environment variables.

use serde::Deserialize;

use crate::bot::commands::AccessList;
use crate::bot::intents::{parse_intents, Intent};
use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Bot Credentials ===
    /// Bot application id (BotAppID).
    #[serde(default)]
    pub bot_app_id: String,

    /// Bot token (BotToken).
    #[serde(default)]
    pub bot_token: String,

    /// Comma-separated intent names to subscribe to.
    #[serde(default = "default_intents")]
    pub bot_intents: String,

    /// Target the sandbox API host.
    #[serde(default = "default_true")]
    pub bot_sandbox: bool,

    // === Operation Modes ===
    /// Start the gateway session at all.
    #[serde(default = "default_true")]
    pub bot_enabled: bool,

    /// Reply to `/hello` and `/help` mentions.
    #[serde(default)]
    pub bot_commands: bool,

    /// User ids allowed to run restricted commands (comma list or `all`).
    #[serde(default)]
    pub bot_command_users: String,

    /// Guild ids allowed to run restricted commands (comma list or `all`).
    #[serde(default)]
    pub bot_command_guilds: String,

    // === Connection Tuning ===
    /// REST request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Ceiling for gateway reconnect backoff in seconds.
    #[serde(default = "default_ws_max_reconnect_delay")]
    pub ws_max_reconnect_delay_s: u64,

    // === Server Configuration ===
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

/// Static bot configuration handed to the REST client and the gateway.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Application id.
    pub app_id: String,
    /// Bot token.
    pub token: String,
    /// Subscribed event intents.
    pub intents: Vec<Intent>,
    /// Target the sandbox environment.
    pub sandbox: bool,
}

impl BotConfig {
    /// Authorization value, `Bot {app_id}.{token}`.
    pub fn bot_token(&self) -> String {
        format!("Bot {}.{}", self.app_id, self.token)
    }

    /// Intents folded into the gateway bitmask.
    pub fn intent_bits(&self) -> u32 {
        Intent::fold(&self.intents)
    }
}

fn default_intents() -> String {
    Intent::PublicGuildMessages.to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_ws_max_reconnect_delay() -> u64 {
    60
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_app_id.trim().is_empty() {
            return Err(ConfigError::Missing("BOT_APP_ID"));
        }

        if !self.bot_app_id.trim().chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                field: "BOT_APP_ID",
                reason: "must be numeric".to_string(),
            });
        }

        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("BOT_TOKEN"));
        }

        if self.ws_max_reconnect_delay_s == 0 {
            return Err(ConfigError::Invalid {
                field: "WS_MAX_RECONNECT_DELAY_S",
                reason: "must be at least 1".to_string(),
            });
        }

        if parse_intents(&self.bot_intents)?.is_empty() {
            return Err(ConfigError::Missing("BOT_INTENTS"));
        }

        Ok(())
    }

    /// Build the static bot configuration.
    pub fn bot_config(&self) -> Result<BotConfig, ConfigError> {
        self.validate()?;
        Ok(BotConfig {
            app_id: self.bot_app_id.trim().to_string(),
            token: self.bot_token.trim().to_string(),
            intents: parse_intents(&self.bot_intents)?,
            sandbox: self.bot_sandbox,
        })
    }

    /// Access list for restricted commands.
    pub fn command_access(&self) -> AccessList {
        AccessList::from_lists(&self.bot_command_users, &self.bot_command_guilds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            bot_app_id: "102351684".to_string(),
            bot_token: "test-token".to_string(),
            bot_intents: default_intents(),
            bot_sandbox: true,
            bot_enabled: true,
            bot_commands: false,
            bot_command_users: String::new(),
            bot_command_guilds: String::new(),
            http_timeout_ms: default_http_timeout_ms(),
            ws_max_reconnect_delay_s: default_ws_max_reconnect_delay(),
            port: default_port(),
            rust_log: default_log_level(),
            log_json: false,
        }
    }

    #[test]
    fn default_values_are_sensible() {
        assert_eq!(default_intents(), "PUBLIC_GUILD_MESSAGES");
        assert_eq!(default_port(), 3000);
        assert!(default_true());
    }

    #[test]
    fn validate_accepts_complete_config() {
        tokio_test::assert_ok!(config().validate());
    }

    #[test]
    fn validate_rejects_empty_app_id() {
        let config = Config {
            bot_app_id: "".to_string(),
            ..config()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("BOT_APP_ID"))
        ));
    }

    #[test]
    fn validate_rejects_non_numeric_app_id() {
        let config = Config {
            bot_app_id: "abc".to_string(),
            ..config()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "BOT_APP_ID", .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_token() {
        let config = Config {
            bot_token: "  ".to_string(),
            ..config()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("BOT_TOKEN"))
        ));
    }

    #[test]
    fn validate_rejects_unknown_intent() {
        let config = Config {
            bot_intents: "GUILDS,NOT_AN_INTENT".to_string(),
            ..config()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownIntent(name)) if name == "NOT_AN_INTENT"
        ));
    }

    #[test]
    fn validate_rejects_empty_intents() {
        let config = Config {
            bot_intents: " , ".to_string(),
            ..config()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("BOT_INTENTS"))
        ));
    }

    #[test]
    fn bot_config_carries_credentials_and_intents() {
        let bot = config().bot_config().unwrap();

        assert_eq!(bot.app_id, "102351684");
        assert_eq!(bot.intents, vec![Intent::PublicGuildMessages]);
        assert!(bot.sandbox);
        assert_eq!(bot.bot_token(), "Bot 102351684.test-token");
        assert_eq!(bot.intent_bits(), 1 << 30);
    }

    #[test]
    fn command_access_defaults_open() {
        assert_eq!(config().command_access(), AccessList::open());
    }

    #[test]
    fn command_access_reads_id_lists() {
        let config = Config {
            bot_command_users: "840042638".to_string(),
            bot_command_guilds: "343331682,220666756".to_string(),
            ..config()
        };

        let access = config.command_access();
        assert!(access.permits(Some("840042638"), None));
        assert!(access.permits(Some("1"), Some("220666756")));
        assert!(!access.permits(Some("1"), Some("2")));
    }
}
