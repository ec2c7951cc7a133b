//! Outbound CCS JSON messages (downstream data + ack).
//!
//! Emission rules:
//! - `to`, `message_id`, `data` are always present.
//! - `collapse_key` / `time_to_live` only when set.
//! - `delay_while_idle` only when set **and** true; `false` is never emitted.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{CcsError, Result};

/// Downstream data message.
#[derive(Debug, Clone, Serialize)]
pub struct DataMessage<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    collapse_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_to_live: Option<u64>,
    #[serde(skip_serializing_if = "not_true")]
    delay_while_idle: Option<bool>,
    message_id: &'a str,
    data: &'a BTreeMap<String, String>,
}

fn not_true(v: &Option<bool>) -> bool {
    *v != Some(true)
}

impl<'a> DataMessage<'a> {
    pub fn new(to: &'a str, message_id: &'a str, data: &'a BTreeMap<String, String>) -> Self {
        Self {
            to,
            collapse_key: None,
            time_to_live: None,
            delay_while_idle: None,
            message_id,
            data,
        }
    }

    pub fn collapse_key(mut self, key: Option<&'a str>) -> Self {
        self.collapse_key = key;
        self
    }

    /// Time to live in seconds.
    pub fn time_to_live(mut self, secs: Option<u64>) -> Self {
        self.time_to_live = secs;
        self
    }

    pub fn delay_while_idle(mut self, delay: Option<bool>) -> Self {
        self.delay_while_idle = delay;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| CcsError::Serialization(format!("data message: {e}")))
    }
}

#[derive(Serialize)]
struct AckMessage<'a> {
    message_type: &'static str,
    to: &'a str,
    message_id: &'a str,
}

/// Build a JSON-encoded downstream data message.
pub fn build_data_message(
    to: &str,
    message_id: &str,
    payload: &BTreeMap<String, String>,
    collapse_key: Option<&str>,
    time_to_live: Option<u64>,
    delay_while_idle: Option<bool>,
) -> Result<String> {
    DataMessage::new(to, message_id, payload)
        .collapse_key(collapse_key)
        .time_to_live(time_to_live)
        .delay_while_idle(delay_while_idle)
        .to_json()
}

/// Build a JSON-encoded ack for an upstream message.
pub fn build_ack(to: &str, message_id: &str) -> Result<String> {
    let ack = AckMessage {
        message_type: "ack",
        to,
        message_id,
    };
    serde_json::to_string(&ack).map_err(|e| CcsError::Serialization(format!("ack: {e}")))
}
