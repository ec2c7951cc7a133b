//! Minimal metrics registry for the client.
//!
//! Counters with dynamic labels backed by `DashMap`. Labels are flattened into
//! sorted key vectors to keep deterministic ordering.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let label_str = r
                .key()
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str, val);
        }
    }
}

#[derive(Default)]
pub struct ClientMetrics {
    /// Stanzas handed to the transport.
    pub stanzas_sent: CounterVec,
    /// Stanzas delivered by the transport.
    pub stanzas_received: CounterVec,
    /// Classified inbound messages (`kind` = data|ack|nack|unrecognized).
    pub inbound_messages: CounterVec,
    /// Errors isolated at the stanza boundary (`code` = error code).
    pub stanza_errors: CounterVec,
    /// Transport lifecycle events (`event` = label).
    pub lifecycle_events: CounterVec,
}

impl ClientMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.stanzas_sent.render("ccslink_stanzas_sent_total", &mut out);
        self.stanzas_received.render("ccslink_stanzas_received_total", &mut out);
        self.inbound_messages.render("ccslink_inbound_messages_total", &mut out);
        self.stanza_errors.render("ccslink_stanza_errors_total", &mut out);
        self.lifecycle_events.render("ccslink_lifecycle_events_total", &mut out);
        out
    }
}
