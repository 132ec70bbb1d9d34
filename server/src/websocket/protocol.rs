//! WebSocket message protocol definitions.
//!
//! Every message is a JSON envelope of the form
//! `{ "type", "user_id", "device_id", "data", "timestamp" }`.

use chrono::{DateTime, Utc};
use marksync_engine::SyncEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Message received from a device.
///
/// `type` is kept as a plain string so an unknown type can be reported
/// instead of failing to parse.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl InboundMessage {
    /// `data.last_sync_time` in unix seconds, if present and numeric.
    pub fn last_sync_time(&self) -> Option<i64> {
        self.data
            .as_ref()
            .and_then(|data| data.get("last_sync_time"))
            .and_then(parse_last_sync_time)
    }
}

/// Read a unix-seconds watermark from an integer, a float or a numeric string.
pub fn parse_last_sync_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Outbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Pong,
    SyncResponse,
    Error,
}

/// Message sent to a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub user_id: String,
    pub device_id: String,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    fn new(kind: MessageType, user_id: &str, device_id: &str, data: Option<Value>) -> Self {
        Self {
            kind,
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn pong(user_id: &str, device_id: &str) -> Self {
        Self::new(MessageType::Pong, user_id, device_id, None)
    }

    /// Response carrying a delta, `{"events": [...]}`.
    pub fn sync_response(
        user_id: &str,
        device_id: &str,
        events: &[SyncEvent],
    ) -> serde_json::Result<Self> {
        let data = json!({ "events": serde_json::to_value(events)? });
        Ok(Self::new(MessageType::SyncResponse, user_id, device_id, Some(data)))
    }

    pub fn error(user_id: &str, device_id: &str, message: impl Into<String>) -> Self {
        let data = json!({ "message": message.into() });
        Self::new(MessageType::Error, user_id, device_id, Some(data))
    }
}
