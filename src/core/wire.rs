use serde::{Deserialize, Serialize};
use sonic_rs::{JsonValueTrait, Value};

use super::types::{WebSocketError, WebSocketResult};

/// Discriminant of the liveness probe frame.
pub const PING_TYPE: &str = "PING";
/// Discriminant of the liveness acknowledgment frame.
pub const PONG_TYPE: &str = "PONG";
/// Action name for free-form application payloads.
pub const CUSTOM_ACTION: &str = "custom";

/// One outbound command: a mandatory `type` discriminant plus an action-specific `data` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Command {
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data: Some(data),
        }
    }

    /// A command with no `data` field.
    pub fn bare(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: None,
        }
    }

    pub fn custom(data: Value) -> Self {
        Self::new(CUSTOM_ACTION, data)
    }

    /// Serialize to a single self-contained text frame.
    pub fn to_frame(&self) -> WebSocketResult<String> {
        sonic_rs::to_string(self).map_err(|e| WebSocketError::SendFailed(e.to_string()))
    }
}

#[derive(Serialize)]
struct Probe {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: u64,
}

/// Heartbeat probe frame: `{"type":"PING","timestamp":<ms>}`.
pub fn ping_frame(timestamp_ms: u64) -> WebSocketResult<String> {
    sonic_rs::to_string(&Probe {
        kind: PING_TYPE,
        timestamp: timestamp_ms,
    })
    .map_err(|e| WebSocketError::SendFailed(e.to_string()))
}

/// Classified inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Heartbeat acknowledgment. Consumed internally.
    Ack,
    /// Application frame, forwarded to subscribers.
    Message(Value),
}

pub fn classify_inbound(raw: &str) -> WebSocketResult<Inbound> {
    let value: Value =
        sonic_rs::from_str(raw).map_err(|e| WebSocketError::ParseFailed(e.to_string()))?;
    if value.get("type").and_then(|t| t.as_str()) == Some(PONG_TYPE) {
        return Ok(Inbound::Ack);
    }
    Ok(Inbound::Message(value))
}
