//! Guild bot HTTP server entry point.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guild_bot_server::api::{create_app, AppState};
use guild_bot_server::bot::commands::{self, AccessList, Handled};
use guild_bot_server::bot::{self, GatewayEvent, OpenApiClient};
use guild_bot_server::config::Config;
use guild_bot_server::metrics;
use guild_bot_server::utils::shutdown_signal;

/// HTTP server with a QQ guild bot attached.
#[derive(Parser, Debug)]
#[command(name = "guild-bot-server")]
#[command(about = "Serves a small HTTP router and keeps a QQ guild bot session alive")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve HTTP only, without the bot gateway.
    #[arg(long)]
    no_bot: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and bot gateway (default).
    Run {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve HTTP only, without the bot gateway.
        #[arg(long)]
        no_bot: bool,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Connect to the gateway until the session is ready (diagnostic).
    WsTest {
        /// Seconds to wait for READY.
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Configuration is loaded before logging so LOG_JSON can take effect;
    // errors are reported once the subscriber is up.
    let config = Config::load();
    let log_json = config.as_ref().map(|c| c.log_json).unwrap_or(false);
    let default_level = config
        .as_ref()
        .map(|c| c.rust_log.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("guild_bot_server=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(&config),
        Some(Command::WsTest { timeout }) => cmd_ws_test(&config, timeout).await,
        Some(Command::Run { port, no_bot }) => cmd_run(config, port, no_bot).await,
        None => cmd_run(config, args.port, args.no_bot).await,
    }
}

/// Check configuration validity.
fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("GUILD BOT SERVER - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Validating configuration... ");
    let bot = match config.bot_config() {
        Ok(bot) => {
            println!("OK");
            bot
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    };

    print!("Building bot handles... ");
    if let Err(e) = bot::create_handles(config, &bot) {
        println!("FAILED");
        println!("  Error: {}", e);
        return Err(anyhow::anyhow!("Bot client construction failed"));
    }
    println!("OK");

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  App ID: {}", bot.app_id);
    println!("  Token: present ({} chars)", bot.token.len());
    println!(
        "  Intents: {} (0x{:08x})",
        bot.intents
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        bot.intent_bits()
    );
    println!(
        "  Environment: {} ({})",
        if bot.sandbox { "SANDBOX" } else { "PRODUCTION" },
        bot::openapi::api_base(bot.sandbox)
    );
    println!("  Gateway: {}", if config.bot_enabled { "Enabled" } else { "Disabled" });
    println!("  Commands: {}", if config.bot_commands { "Enabled" } else { "Disabled" });
    println!(
        "  Command access: {}",
        if config.command_access() == AccessList::open() {
            "everyone".to_string()
        } else {
            format!(
                "users [{}], guilds [{}]",
                config.bot_command_users, config.bot_command_guilds
            )
        }
    );
    println!("  HTTP Port: {}", config.port);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the HTTP server and, unless disabled, the bot gateway.
async fn cmd_run(config: Config, port_override: Option<u16>, no_bot: bool) -> anyhow::Result<()> {
    let port = port_override.unwrap_or(config.port);
    let bot_enabled = config.bot_enabled && !no_bot;

    // Initialize metrics
    let mut app_state = AppState::new(bot_enabled);
    match metrics::init_metrics() {
        Ok(handle) => {
            let upkeep = handle.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(5));
                loop {
                    interval.tick().await;
                    upkeep.run_upkeep();
                }
            });
            app_state = app_state.with_metrics(handle);
        }
        Err(e) => warn!(error = %e, "Metrics recorder not installed"),
    }

    let mut gateway_task = None;
    if bot_enabled {
        let bot = config.bot_config().map_err(|e| {
            error!("Invalid configuration: {}", e);
            e
        })?;

        info!(
            app_id = %bot.app_id,
            intents = ?bot.intents,
            sandbox = bot.sandbox,
            "Starting bot"
        );

        // Handles are built from the static config; the routes never see them.
        let (api, gateway) = bot::create_handles(&config, &bot)?;
        info!(base_url = %api.base_url(), "REST client ready");

        let (events, task) = Arc::new(gateway).run_with_reconnect();
        gateway_task = Some(task);
        let commands = config.bot_commands.then(|| config.command_access());
        tokio::spawn(consume_events(events, app_state.clone(), api, commands));
    } else {
        info!("Bot gateway disabled, serving HTTP only");
    }

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = gateway_task {
        task.abort();
        info!("Gateway stopped");
    }

    info!("HTTP server stopped");
    Ok(())
}

/// Consume gateway events: track readiness, count events, answer commands
/// when an access list is given.
async fn consume_events(
    mut events: mpsc::Receiver<GatewayEvent>,
    state: AppState,
    api: OpenApiClient,
    commands: Option<AccessList>,
) {
    while let Some(event) = events.recv().await {
        match event {
            GatewayEvent::Ready { session_id, user } => {
                state
                    .session_ready(Some(session_id), Some(user.username))
                    .await;
            }
            GatewayEvent::Resumed => state.session_ready(None, None).await,
            GatewayEvent::Disconnected => {
                warn!("Gateway disconnected");
                state.session_lost();
            }
            GatewayEvent::Dispatch(event) => {
                state.stats.events_received.fetch_add(1, Ordering::Relaxed);
                debug!(event_type = %event.event_type, seq = ?event.seq, "Gateway event");

                let Some(access) = commands.clone() else {
                    continue;
                };
                let Some(message) = event.message() else {
                    continue;
                };

                let api = api.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    match commands::handle_message(&api, &message, &access).await {
                        Ok(Handled::Answered) => {
                            state.stats.commands_answered.fetch_add(1, Ordering::Relaxed);
                            metrics::inc_commands_answered();
                        }
                        Ok(Handled::Denied) | Ok(Handled::Ignored) => {}
                        Err(e) => warn!(error = %e, "Failed to answer command"),
                    }
                });
            }
        }
    }

    info!("Gateway event stream ended");
}

/// Connect to the gateway and wait for READY.
async fn cmd_ws_test(config: &Config, timeout_s: u64) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("GUILD BOT SERVER - GATEWAY TEST");
    println!("======================================================================");

    let bot = config.bot_config()?;
    let (api, gateway) = bot::create_handles(config, &bot)?;

    print!("Fetching bot user... ");
    match api.me().await {
        Ok(user) => {
            println!("OK");
            println!("  Bot: {} ({})", user.username, user.id);
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(e.into());
        }
    }

    println!("Connecting to gateway (timeout {}s)...", timeout_s);
    let gateway = Arc::new(gateway);
    let (mut events, task) = gateway.clone().run_with_reconnect();

    let wait = async {
        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Ready { session_id, user } => {
                    println!("READY");
                    println!("  Session: {}", session_id);
                    println!("  User: {}", user.username);
                    return true;
                }
                GatewayEvent::Disconnected => println!("  disconnected, retrying"),
                other => println!("  event: {:?}", other),
            }
        }
        false
    };

    let ready = tokio::time::timeout(Duration::from_secs(timeout_s), wait)
        .await
        .unwrap_or(false);
    task.abort();

    println!("----------------------------------------------------------------------");
    println!("  Reconnect attempts: {}", gateway.reconnect_attempts());
    println!("======================================================================");

    if ready {
        println!("GATEWAY TEST PASSED");
        Ok(())
    } else {
        println!("GATEWAY TEST FAILED");
        Err(anyhow::anyhow!("gateway did not become ready"))
    }
}
