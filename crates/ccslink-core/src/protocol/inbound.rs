//! Inbound CCS payload classification.
//!
//! The discriminator is `message_type`:
//! - absent (or JSON `null`) => upstream data message
//! - `"ack"` / `"nack"`      => delivery receipt for one of our sends
//! - anything else           => unrecognized (caller logs, never fails)

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{CcsError, Result};

/// Upstream data message from a device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamData {
    pub from: String,
    pub message_id: String,
    /// Package name of the sending application.
    #[serde(default)]
    pub category: Option<String>,
    /// Payload as strings. Non-string values arrive in their compact JSON
    /// form, `null` values are dropped, and a non-object `data` reads as empty.
    #[serde(default, deserialize_with = "string_map")]
    pub data: BTreeMap<String, String>,
}

fn string_map<'de, D>(de: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Object(map)) = Option::<Value>::deserialize(de)? else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

/// Ack for a message we sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Receipt {
    pub from: String,
    pub message_id: String,
}

/// Nack for a message we sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NackReceipt {
    pub from: String,
    pub message_id: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Decoded inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Data(UpstreamData),
    Ack(Receipt),
    Nack(NackReceipt),
    Unrecognized {
        message_type: String,
        body: Map<String, Value>,
    },
}

impl ControlMessage {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Data(_) => "data",
            ControlMessage::Ack(_) => "ack",
            ControlMessage::Nack(_) => "nack",
            ControlMessage::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// Parse envelope JSON and classify it.
pub fn classify(json: &str) -> Result<ControlMessage> {
    let body: Map<String, Value> = serde_json::from_str(json)
        .map_err(|e| CcsError::InvalidPayload(format!("invalid json: {e}")))?;

    let message_type = match body.get("message_type") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    match message_type.as_deref() {
        None => Ok(ControlMessage::Data(variant(body, "data message")?)),
        Some("ack") => Ok(ControlMessage::Ack(variant(body, "ack")?)),
        Some("nack") => Ok(ControlMessage::Nack(variant(body, "nack")?)),
        Some(other) => Ok(ControlMessage::Unrecognized {
            message_type: other.to_string(),
            body,
        }),
    }
}

fn variant<T: DeserializeOwned>(body: Map<String, Value>, what: &str) -> Result<T> {
    serde_json::from_value(Value::Object(body))
        .map_err(|e| CcsError::InvalidPayload(format!("{what}: {e}")))
}
