//! Gateway session state machine.
//!
//! [`Session`] turns inbound gateway frames into [`Step`]s for the connection
//! driver. It does no I/O, so the whole identify/resume/heartbeat protocol can
//! be exercised without a socket.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::types::{
    DispatchEvent, GatewayEvent, Hello, Identify, IdentifyProperties, OpCode, Payload, Ready,
    Resume, User,
};
use crate::config::BotConfig;
use crate::error::WsError;

/// What the driver should do after a frame or a heartbeat tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Nothing to do.
    Idle,
    /// Start heartbeating at this interval, then send the handshake frame.
    Handshake {
        /// Heartbeat interval.
        heartbeat: Duration,
        /// Identify or Resume frame.
        payload: Payload,
    },
    /// Send a frame.
    Send(Payload),
    /// Hand an event to the consumer.
    Emit(GatewayEventKind),
    /// Close the connection and reconnect.
    Reconnect {
        /// Keep the session for a resume.
        resumable: bool,
    },
}

/// Event kinds emitted by the state machine.
///
/// Mirrors [`GatewayEvent`] minus the driver-only `Disconnected` variant and
/// with `PartialEq` for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEventKind {
    /// Session identified.
    Ready {
        /// Session id.
        session_id: String,
        /// The bot user.
        user: User,
    },
    /// Session resumed.
    Resumed,
    /// Any other dispatch.
    Dispatch {
        /// Event name.
        event_type: String,
        /// Sequence number.
        seq: Option<u64>,
        /// Raw data.
        data: Value,
    },
}

impl From<GatewayEventKind> for GatewayEvent {
    fn from(kind: GatewayEventKind) -> Self {
        match kind {
            GatewayEventKind::Ready { session_id, user } => GatewayEvent::Ready { session_id, user },
            GatewayEventKind::Resumed => GatewayEvent::Resumed,
            GatewayEventKind::Dispatch {
                event_type,
                seq,
                data,
            } => GatewayEvent::Dispatch(DispatchEvent {
                event_type,
                seq,
                data,
            }),
        }
    }
}

/// Per-bot gateway session state. Survives reconnects so a dropped connection
/// can be resumed.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    intents: u32,
    shard: [u32; 2],
    session_id: Option<String>,
    last_seq: Option<u64>,
    awaiting_ack: bool,
    user: Option<User>,
}

impl Session {
    /// Fresh session for the configured bot on shard `[0, 1]`.
    pub fn new(config: &BotConfig) -> Self {
        Self {
            token: config.bot_token(),
            intents: config.intent_bits(),
            shard: [0, 1],
            session_id: None,
            last_seq: None,
            awaiting_ack: false,
            user: None,
        }
    }

    /// Session id from the last READY, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last dispatch sequence seen.
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Bot user from the last READY.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Whether a resume is possible on the next connection.
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.last_seq.is_some()
    }

    /// Reset per-connection state. Call before every new connection.
    pub fn on_connect(&mut self) {
        self.awaiting_ack = false;
    }

    /// Forget the session so the next connection identifies.
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.last_seq = None;
        self.user = None;
    }

    /// Heartbeat timer fired.
    pub fn on_heartbeat_tick(&mut self) -> Step {
        if self.awaiting_ack {
            warn!("Heartbeat not acknowledged, connection looks dead");
            return Step::Reconnect { resumable: true };
        }
        self.awaiting_ack = true;
        Step::Send(Payload::heartbeat(self.last_seq))
    }

    /// Handle one inbound frame.
    pub fn on_payload(&mut self, payload: Payload) -> Result<Step, WsError> {
        let Some(op) = payload.opcode() else {
            debug!(op = payload.op, "Ignoring unknown opcode");
            return Ok(Step::Idle);
        };

        match op {
            OpCode::Hello => {
                let hello: Hello = serde_json::from_value(payload.d)
                    .map_err(|e| WsError::ParseError(format!("hello: {}", e)))?;
                if hello.heartbeat_interval == 0 {
                    return Err(WsError::ParseError(
                        "hello: heartbeat_interval must be non-zero".to_string(),
                    ));
                }
                Ok(Step::Handshake {
                    heartbeat: Duration::from_millis(hello.heartbeat_interval),
                    payload: self.handshake()?,
                })
            }
            OpCode::Dispatch => self.on_dispatch(payload),
            OpCode::Heartbeat => Ok(Step::Send(Payload::heartbeat(self.last_seq))),
            OpCode::HeartbeatAck => {
                self.awaiting_ack = false;
                Ok(Step::Idle)
            }
            OpCode::Reconnect => {
                info!("Gateway requested reconnect");
                Ok(Step::Reconnect { resumable: true })
            }
            OpCode::InvalidSession => {
                warn!("Gateway rejected session, will identify again");
                self.invalidate();
                Ok(Step::Reconnect { resumable: false })
            }
            OpCode::HttpCallbackAck | OpCode::Identify | OpCode::Resume => Ok(Step::Idle),
        }
    }

    /// Identify, or Resume when a session is held.
    fn handshake(&self) -> Result<Payload, WsError> {
        let data = match (&self.session_id, self.last_seq) {
            (Some(session_id), Some(seq)) => {
                info!(session_id = %session_id, seq, "Resuming session");
                let resume = Resume {
                    token: self.token.clone(),
                    session_id: session_id.clone(),
                    seq,
                };
                return to_payload(OpCode::Resume, &resume);
            }
            _ => Identify {
                token: self.token.clone(),
                intents: self.intents,
                shard: self.shard,
                properties: IdentifyProperties::default(),
            },
        };
        info!(intents = self.intents, "Identifying");
        to_payload(OpCode::Identify, &data)
    }

    fn on_dispatch(&mut self, payload: Payload) -> Result<Step, WsError> {
        if let Some(seq) = payload.s {
            self.last_seq = Some(seq);
        }

        let event_type = payload.t.unwrap_or_default();
        match event_type.as_str() {
            "READY" => {
                let ready: Ready = serde_json::from_value(payload.d)
                    .map_err(|e| WsError::ParseError(format!("ready: {}", e)))?;
                info!(
                    session_id = %ready.session_id,
                    user = %ready.user.username,
                    version = ready.version,
                    "Gateway session ready"
                );
                self.session_id = Some(ready.session_id.clone());
                self.user = Some(ready.user.clone());
                Ok(Step::Emit(GatewayEventKind::Ready {
                    session_id: ready.session_id,
                    user: ready.user,
                }))
            }
            "RESUMED" => {
                info!("Gateway session resumed");
                Ok(Step::Emit(GatewayEventKind::Resumed))
            }
            _ => Ok(Step::Emit(GatewayEventKind::Dispatch {
                event_type,
                seq: payload.s,
                data: payload.d,
            })),
        }
    }
}

fn to_payload<T: serde::Serialize>(op: OpCode, data: &T) -> Result<Payload, WsError> {
    let d = serde_json::to_value(data).map_err(|e| WsError::SendFailed(e.to_string()))?;
    Ok(Payload::new(op, d))
}
