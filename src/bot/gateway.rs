//! Gateway websocket client.
//!
//! Features:
//! - Gateway URL lookup through the REST client
//! - Identify/resume handshake and heartbeats driven by [`Session`]
//! - Automatic reconnection with exponential backoff

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::openapi::OpenApiClient;
use super::session::{Session, Step};
use super::types::{GatewayEvent, OpCode, Payload};
use crate::config::BotConfig;
use crate::error::WsError;
use crate::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Event channel capacity.
const EVENT_BUFFER: usize = 1000;

/// Reconnection configuration for the gateway.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 60,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(max_delay_s: u64) -> Self {
        Self {
            max_delay_s,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt.min(32) as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Why a single connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// Gateway or heartbeat asked for a new connection.
    Reconnect { resumable: bool },
    /// Event receiver was dropped.
    ConsumerGone,
}

/// Gateway connection for one bot.
pub struct GatewayClient {
    /// REST client used for the gateway URL lookup.
    api: OpenApiClient,
    /// Protocol state kept across reconnects.
    session: Mutex<Session>,
    /// Reconnection configuration.
    reconnect_config: ReconnectConfig,
    /// Connection state (atomic for thread safety).
    connected: Arc<AtomicBool>,
    /// Reconnection attempt counter.
    reconnect_attempts: Arc<AtomicU64>,
    /// Last inbound frame timestamp.
    last_message_time: Arc<RwLock<Option<Instant>>>,
}

impl GatewayClient {
    /// Create a gateway client. No connection is made until [`run_with_reconnect`].
    ///
    /// [`run_with_reconnect`]: GatewayClient::run_with_reconnect
    pub fn new(config: &BotConfig, api: OpenApiClient) -> Self {
        Self::with_reconnect_config(config, api, ReconnectConfig::default())
    }

    /// Create with custom reconnection config.
    pub fn with_reconnect_config(
        config: &BotConfig,
        api: OpenApiClient,
        reconnect_config: ReconnectConfig,
    ) -> Self {
        Self {
            api,
            session: Mutex::new(Session::new(config)),
            reconnect_config,
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU64::new(0)),
            last_message_time: Arc::new(RwLock::new(None)),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get reconnection attempt count.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Current session id, if identified.
    pub fn session_id(&self) -> Option<String> {
        self.session().session_id().map(str::to_string)
    }

    /// Time since the last inbound frame.
    pub fn since_last_message(&self) -> Option<Duration> {
        self.last_message_time
            .read()
            .ok()
            .and_then(|time| time.map(|t| t.elapsed()))
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the gateway with automatic reconnection on disconnect.
    ///
    /// Returns a receiver that yields gateway events and the handle of the
    /// connection task. Dropping the receiver stops the loop at its next
    /// event; aborting the handle stops it immediately.
    pub fn run_with_reconnect(
        self: Arc<Self>,
    ) -> (mpsc::Receiver<GatewayEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(async move {
            let mut attempt = 0u32;

            loop {
                info!(attempt = attempt, "Attempting gateway connection");

                let result = self.run_connection(&tx).await;
                let was_connected = self.connected.swap(false, Ordering::SeqCst);
                if was_connected {
                    attempt = 0;
                    if tx.send(GatewayEvent::Disconnected).await.is_err() {
                        info!("Channel closed, stopping gateway");
                        return;
                    }
                }

                match result {
                    Ok(Disconnect::ConsumerGone) => {
                        info!("Channel closed, stopping gateway");
                        return;
                    }
                    Ok(Disconnect::Reconnect { resumable }) => {
                        warn!(resumable, "Gateway connection ended, will reconnect");
                    }
                    Err(e) => {
                        error!(error = %e, attempt = attempt, "Gateway connection failed");
                    }
                }

                let delay = self.reconnect_config.next_delay(attempt);
                self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                metrics::inc_ws_reconnects();

                info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
                tokio::time::sleep(delay).await;

                attempt = attempt.saturating_add(1);
            }
        });

        (rx, task)
    }

    /// Drive one websocket connection until it ends.
    async fn run_connection(&self, tx: &mpsc::Sender<GatewayEvent>) -> Result<Disconnect, WsError> {
        let gateway = self.api.gateway_bot().await?;
        info!(url = %gateway.url, shards = gateway.shards, "Connecting to gateway");

        let (ws_stream, _) = connect_async(gateway.url.as_str())
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        self.session().on_connect();

        let hello = self.next_payload(&mut read).await?;
        if hello.opcode() != Some(OpCode::Hello) {
            return Err(WsError::ExpectedHello(hello.op));
        }

        let step = self.session().on_payload(hello)?;
        let Step::Handshake { heartbeat, payload } = step else {
            return Err(WsError::ExpectedHello(OpCode::Hello.code()));
        };
        send(&mut write, &payload).await?;
        self.connected.store(true, Ordering::SeqCst);
        debug!(interval_ms = heartbeat.as_millis() as u64, "Heartbeat scheduled");

        let mut ticker = heartbeat_ticker(heartbeat);

        loop {
            let step = tokio::select! {
                _ = ticker.tick() => {
                    metrics::inc_heartbeats();
                    let step = self.session().on_heartbeat_tick();
                    step
                }
                payload = self.next_payload(&mut read) => {
                    let step = self.session().on_payload(payload?)?;
                    step
                }
            };

            match step {
                Step::Idle => {}
                Step::Send(payload) => send(&mut write, &payload).await?,
                Step::Handshake { payload, .. } => send(&mut write, &payload).await?,
                Step::Emit(kind) => {
                    metrics::inc_events_dispatched();
                    if tx.send(kind.into()).await.is_err() {
                        let _ = write.close().await;
                        return Ok(Disconnect::ConsumerGone);
                    }
                }
                Step::Reconnect { resumable } => {
                    let _ = write.close().await;
                    return Ok(Disconnect::Reconnect { resumable });
                }
            }
        }
    }

    /// Read frames until the next gateway payload.
    async fn next_payload(&self, read: &mut WsRead) -> Result<Payload, WsError> {
        loop {
            let msg = match read.next().await {
                Some(msg) => msg?,
                None => {
                    return Err(WsError::ConnectionClosed {
                        code: None,
                        reason: "stream ended".to_string(),
                    })
                }
            };

            if let Ok(mut time) = self.last_message_time.write() {
                *time = Some(Instant::now());
            }

            match msg {
                Message::Text(text) => {
                    let start = Instant::now();
                    metrics::inc_ws_messages_received();
                    let payload = serde_json::from_str::<Payload>(&text)
                        .map_err(|e| WsError::ParseError(e.to_string()));
                    metrics::record_ws_message_latency(start);
                    return payload;
                }
                Message::Close(frame) => {
                    warn!(frame = ?frame, "WebSocket closed");
                    return Err(closed(frame));
                }
                Message::Ping(_) => debug!("Received ping"),
                Message::Pong(_) => debug!("Received pong"),
                _ => {}
            }
        }
    }
}

/// Heartbeat timer. The first tick is one period out; a late tick pushes
/// the schedule back instead of firing the missed ticks in a burst.
fn heartbeat_ticker(period: Duration) -> Interval {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn send(write: &mut WsWrite, payload: &Payload) -> Result<(), WsError> {
    let json = serde_json::to_string(payload).map_err(|e| WsError::SendFailed(e.to_string()))?;
    debug!(op = payload.op, "Sending gateway frame");
    write
        .send(Message::Text(json))
        .await
        .map_err(|e| WsError::SendFailed(e.to_string()))
}

fn closed(frame: Option<CloseFrame<'_>>) -> WsError {
    match frame {
        Some(frame) => WsError::ConnectionClosed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        },
        None => WsError::ConnectionClosed {
            code: None,
            reason: String::new(),
        },
    }
}
