//! Wire types for the bot REST API and the gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === REST ===

/// Bot or guild user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    /// User id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub username: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether the user is a bot.
    #[serde(default)]
    pub bot: bool,
}

/// Response of `GET /gateway/bot`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayBot {
    /// Websocket URL to connect to.
    pub url: String,
    /// Recommended shard count.
    #[serde(default = "default_shards")]
    pub shards: u32,
    /// Identify quota.
    pub session_start_limit: Option<SessionStartLimit>,
}

fn default_shards() -> u32 {
    1
}

/// Identify quota attached to the gateway lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartLimit {
    /// Identify calls allowed per window.
    pub total: u32,
    /// Identify calls left in the current window.
    pub remaining: u32,
    /// Milliseconds until the window resets.
    pub reset_after: u64,
    /// Identify calls allowed every 5 seconds.
    pub max_concurrency: u32,
}

/// Message received from a channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Guild the message belongs to.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Raw text content, mentions included.
    #[serde(default)]
    pub content: String,
    /// Sender.
    #[serde(default)]
    pub author: Option<User>,
    /// ISO-8601 timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Body of `POST /channels/{channel_id}/messages`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageToCreate {
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Id of the message being replied to (passive reply).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
}

impl MessageToCreate {
    /// Text reply to a received message.
    pub fn reply(content: impl Into<String>, msg_id: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            msg_id: Some(msg_id.into()),
        }
    }
}

/// Error body returned on non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Platform error code.
    pub code: Option<i64>,
    /// Human readable message.
    pub message: Option<String>,
}

// === Gateway ===

/// Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Server pushes an event.
    Dispatch,
    /// Client keepalive, or server asking for one.
    Heartbeat,
    /// Client authenticates a new session.
    Identify,
    /// Client resumes a dropped session.
    Resume,
    /// Server asks the client to reconnect.
    Reconnect,
    /// Identify or resume was rejected.
    InvalidSession,
    /// First frame after connecting.
    Hello,
    /// Server acknowledged a heartbeat.
    HeartbeatAck,
    /// Acknowledgement of an HTTP callback.
    HttpCallbackAck,
}

impl OpCode {
    /// Numeric opcode on the wire.
    pub const fn code(self) -> u8 {
        match self {
            OpCode::Dispatch => 0,
            OpCode::Heartbeat => 1,
            OpCode::Identify => 2,
            OpCode::Resume => 6,
            OpCode::Reconnect => 7,
            OpCode::InvalidSession => 9,
            OpCode::Hello => 10,
            OpCode::HeartbeatAck => 11,
            OpCode::HttpCallbackAck => 12,
        }
    }

    /// Opcode for a wire value, if known.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(OpCode::Dispatch),
            1 => Some(OpCode::Heartbeat),
            2 => Some(OpCode::Identify),
            6 => Some(OpCode::Resume),
            7 => Some(OpCode::Reconnect),
            9 => Some(OpCode::InvalidSession),
            10 => Some(OpCode::Hello),
            11 => Some(OpCode::HeartbeatAck),
            12 => Some(OpCode::HttpCallbackAck),
            _ => None,
        }
    }
}

/// Frame exchanged over the gateway websocket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Payload {
    /// Opcode.
    pub op: u8,
    /// Event data.
    #[serde(default)]
    pub d: Value,
    /// Sequence number (dispatch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name (dispatch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl Payload {
    /// Outbound frame with the given opcode and data.
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: op.code(),
            d,
            s: None,
            t: None,
        }
    }

    /// Heartbeat carrying the last seen sequence.
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, seq.map_or(Value::Null, Value::from))
    }

    /// Decoded opcode.
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_code(self.op)
    }
}

/// Data of the Hello frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// Data of the Identify frame.
#[derive(Debug, Clone, Serialize)]
pub struct Identify {
    /// `Bot {app_id}.{token}`.
    pub token: String,
    /// Intent bitmask.
    pub intents: u32,
    /// `[shard_id, shard_count]`.
    pub shard: [u32; 2],
    /// Client properties.
    pub properties: IdentifyProperties,
}

/// Client properties sent on identify.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyProperties {
    /// Operating system.
    #[serde(rename = "$os")]
    pub os: String,
    /// Library name.
    #[serde(rename = "$browser")]
    pub browser: String,
    /// Device name.
    #[serde(rename = "$device")]
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Data of the Resume frame.
#[derive(Debug, Clone, Serialize)]
pub struct Resume {
    /// `Bot {app_id}.{token}`.
    pub token: String,
    /// Session being resumed.
    pub session_id: String,
    /// Last sequence received.
    pub seq: u64,
}

/// Data of the READY dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    /// Gateway version.
    #[serde(default)]
    pub version: u32,
    /// Session id used for resume.
    pub session_id: String,
    /// The bot user.
    pub user: User,
    /// `[shard_id, shard_count]`.
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}

/// Dispatched event surfaced to consumers.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Event name, e.g. `AT_MESSAGE_CREATE`.
    pub event_type: String,
    /// Sequence number.
    pub seq: Option<u64>,
    /// Raw event data.
    pub data: Value,
}

impl DispatchEvent {
    /// Whether this event carries a guild channel message.
    ///
    /// Direct messages live in a DM session, not in `channel_id`, so they are
    /// not answered here.
    pub fn is_message(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            "AT_MESSAGE_CREATE" | "MESSAGE_CREATE"
        )
    }

    /// Decode the data as a channel message.
    pub fn message(&self) -> Option<Message> {
        if !self.is_message() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Events emitted by the gateway connection.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Session identified.
    Ready {
        /// Session id.
        session_id: String,
        /// The bot user.
        user: User,
    },
    /// Dropped session resumed.
    Resumed,
    /// Any other dispatch.
    Dispatch(DispatchEvent),
    /// Connection lost; a reconnect follows.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn opcode_codes_are_stable() {
        for op in [
            OpCode::Dispatch,
            OpCode::Heartbeat,
            OpCode::Identify,
            OpCode::Resume,
            OpCode::Reconnect,
            OpCode::InvalidSession,
            OpCode::Hello,
            OpCode::HeartbeatAck,
            OpCode::HttpCallbackAck,
        ] {
            assert_eq!(OpCode::from_code(op.code()), Some(op));
        }
        assert_eq!(OpCode::from_code(3), None);
    }

    #[test]
    fn heartbeat_without_sequence_sends_null() {
        let json = serde_json::to_value(Payload::heartbeat(None)).unwrap();
        assert_eq!(json, json!({"op": 1, "d": null}));

        let json = serde_json::to_value(Payload::heartbeat(Some(42))).unwrap();
        assert_eq!(json, json!({"op": 1, "d": 42}));
    }

    #[test]
    fn identify_properties_use_dollar_keys() {
        let identify = Identify {
            token: "Bot 1.t".to_string(),
            intents: 1 << 30,
            shard: [0, 1],
            properties: IdentifyProperties {
                os: "linux".to_string(),
                browser: "b".to_string(),
                device: "d".to_string(),
            },
        };

        let json = serde_json::to_value(identify).unwrap();
        assert_eq!(
            json,
            json!({
                "token": "Bot 1.t",
                "intents": 1073741824u32,
                "shard": [0, 1],
                "properties": {"$os": "linux", "$browser": "b", "$device": "d"}
            })
        );
    }

    #[test]
    fn dispatch_payload_parses() {
        let payload: Payload = serde_json::from_str(
            r#"{"op":0,"s":3,"t":"AT_MESSAGE_CREATE","d":{"id":"m1","channel_id":"c1","content":"<@!9> /hello"}}"#,
        )
        .unwrap();

        assert_eq!(payload.opcode(), Some(OpCode::Dispatch));
        assert_eq!(payload.s, Some(3));

        let event = DispatchEvent {
            event_type: payload.t.unwrap(),
            seq: payload.s,
            data: payload.d,
        };
        let message = event.message().unwrap();
        assert_eq!(message.channel_id, "c1");
        assert_eq!(message.content, "<@!9> /hello");
    }

    #[test]
    fn non_message_dispatch_has_no_message() {
        let event = DispatchEvent {
            event_type: "GUILD_CREATE".to_string(),
            seq: Some(1),
            data: json!({"id": "g"}),
        };
        assert!(event.message().is_none());
    }

    #[test]
    fn direct_message_is_not_a_channel_message() {
        let event = DispatchEvent {
            event_type: "DIRECT_MESSAGE_CREATE".to_string(),
            seq: Some(2),
            data: json!({"id": "m2", "channel_id": "c2", "guild_id": "dm-guild", "content": "/hello"}),
        };
        assert!(!event.is_message());
        assert!(event.message().is_none());
    }

    #[test]
    fn message_to_create_omits_empty_fields() {
        let json = serde_json::to_value(MessageToCreate {
            content: Some("hi".to_string()),
            msg_id: None,
        })
        .unwrap();
        assert_eq!(json, json!({"content": "hi"}));
    }
}
