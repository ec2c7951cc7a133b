//! Session manager driven through the in-memory transport.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use ccslink_client::config::{self, ClientConfig};
use ccslink_client::dispatch::{DispatchCtx, MessageHandler};
use ccslink_client::session::{LifecycleListener, LinkState, SendOptions, SessionManager};
use ccslink_client::transport::{MemoryTransport, SecurityMode, TransportEvent};
use ccslink_core::error::{ConnectKind, Result};
use ccslink_core::protocol::{EnvelopeCodec, UpstreamData};

const WAIT: Duration = Duration::from_secs(2);

fn cfg(extra: &str) -> ClientConfig {
    let yaml = format!(
        r#"
version: 1
auth:
  sender_id: "123456"
  api_key: "secret"
server:
  connect_timeout_ms: 1000
{extra}
"#
    );
    config::load_from_str(&yaml).unwrap()
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn push(&self, e: impl Into<String>) {
        self.events.lock().unwrap().push(e.into());
    }

    fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl LifecycleListener for RecordingListener {
    fn on_connected(&self) {
        self.push("connected");
    }
    fn on_authenticated(&self) {
        self.push("authenticated");
    }
    fn on_reconnecting(&self, delay_secs: u32) {
        self.push(format!("reconnecting:{delay_secs}"));
    }
    fn on_reconnect_succeeded(&self) {
        self.push("reconnect_succeeded");
    }
    fn on_reconnect_failed(&self, error: &str) {
        self.push(format!("reconnect_failed:{error}"));
    }
    fn on_closed(&self) {
        self.push("closed");
    }
    fn on_closed_on_error(&self, error: &str) {
        self.push(format!("closed_on_error:{error}"));
    }
}

async fn wait_state(mgr: &SessionManager, want: LinkState) {
    let mut rx = mgr.subscribe_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == want))
        .await
        .expect("state change timed out")
        .expect("state channel closed");
}

async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

fn sent_json(stanzas: &[ccslink_core::protocol::Stanza]) -> Vec<String> {
    let codec = EnvelopeCodec::default();
    stanzas
        .iter()
        .map(|s| codec.decode_stanza(s).unwrap().into_json())
        .collect()
}

#[tokio::test]
async fn connect_uses_ccs_parameters() {
    ccslink_client::obs::init_tracing();
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .build()
        .unwrap();

    assert_eq!(mgr.state(), LinkState::Disconnected);
    mgr.connect_from_config().await.unwrap();
    assert_eq!(mgr.state(), LinkState::Connected);

    let params = transport.last_params().await.unwrap();
    assert_eq!(params.host, "gcm.googleapis.com");
    assert_eq!(params.port, 5235);
    assert_eq!(params.security, SecurityMode::Required);
    assert!(!params.send_presence);
    assert!(!params.roster_at_login);
    assert!(params.reconnect);

    assert_eq!(
        transport.logged_in_as().await.as_deref(),
        Some("123456@gcm.googleapis.com")
    );
    assert!(mgr.extensions().is_sealed());
}

#[tokio::test]
async fn rejected_credentials_close_the_session() {
    let transport = Arc::new(MemoryTransport::new().reject_login());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .build()
        .unwrap();

    let err = mgr.connect("123456@gcm.googleapis.com", "wrong").await.unwrap_err();
    assert_eq!(err.code().as_str(), "AUTH_FAILED");
    assert!(err.is_terminal());
    assert_eq!(mgr.state(), LinkState::Closed);
    assert!(!transport.is_connected().await);

    let err = mgr.send("{}").await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_CONNECTED");
}

#[tokio::test]
async fn unreachable_server_reports_connect_failure() {
    let transport = Arc::new(MemoryTransport::new().fail_connect(ConnectKind::Network));
    let mgr = SessionManager::builder(cfg(""), transport).build().unwrap();

    let err = mgr.connect_from_config().await.unwrap_err();
    assert_eq!(err.code().as_str(), "CONNECT_FAILED");
    assert_eq!(mgr.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn slow_server_times_out() {
    let transport = Arc::new(MemoryTransport::new().delay_connect(Duration::from_secs(5)));
    let mgr = SessionManager::builder(cfg(""), transport).build().unwrap();

    let err = mgr.connect_from_config().await.unwrap_err();
    assert_eq!(err.code().as_str(), "CONNECT_FAILED");
    assert!(err.to_string().contains("timeout"));
    assert_eq!(mgr.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn send_requires_a_session() {
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .build()
        .unwrap();

    let err = mgr.send(r#"{"to":"x"}"#).await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_CONNECTED");

    mgr.connect_from_config().await.unwrap();
    mgr.close().await;
    assert_eq!(mgr.state(), LinkState::Closed);
    assert!(!transport.is_connected().await);

    let err = mgr.send(r#"{"to":"x"}"#).await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_CONNECTED");
    assert!(transport.sent().await.is_empty());

    tokio::time::timeout(WAIT, mgr.wait_closed()).await.unwrap();
}

#[tokio::test]
async fn second_connect_is_refused() {
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg(""), transport).build().unwrap();

    mgr.connect_from_config().await.unwrap();
    let err = mgr.connect_from_config().await.unwrap_err();
    assert_eq!(err.code().as_str(), "INTERNAL");
    assert_eq!(mgr.state(), LinkState::Connected);
}

#[tokio::test]
async fn inbound_echo_gets_reply_and_ack() {
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();

    transport
        .deliver_xml(
            r#"<message id=""><gcm xmlns="google:mobile:data">{"category":"com.example","data":{"ACTION":"ECHO","CLIENT_MESSAGE":"hi"},"message_id":"m-1","from":"dev1"}</gcm></message>"#,
        )
        .await
        .unwrap();

    let sent = sent_json(&transport.wait_for_sent(2, WAIT).await.unwrap());
    let reply: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(reply["to"], "dev1");
    assert_eq!(reply["collapse_key"], "echo:CollapseKey");
    assert_eq!(reply["data"]["SERVER_MESSAGE"], "ECHO: hi");
    assert_ne!(reply["message_id"], "m-1");
    assert_eq!(
        sent[1],
        r#"{"message_type":"ack","to":"dev1","message_id":"m-1"}"#
    );

    let metrics = mgr.metrics();
    assert_eq!(metrics.stanzas_received.get(&[]), 1);
    eventually(|| metrics.inbound_messages.get(&[("kind", "data")]) == 1).await;
    eventually(|| metrics.stanzas_sent.get(&[]) == 2).await;
}

#[tokio::test]
async fn malformed_stanza_does_not_stop_the_session() {
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();

    transport
        .deliver_xml(r#"<message><body>plain chat</body></message>"#)
        .await
        .unwrap();
    transport
        .deliver_xml(r#"<message><gcm xmlns="google:mobile:data">{oops</gcm></message>"#)
        .await
        .unwrap();
    transport
        .deliver_xml(
            r#"<message><gcm xmlns="google:mobile:data">{"from":"dev9","message_id":"m-9","data":{}}</gcm></message>"#,
        )
        .await
        .unwrap();

    let sent = sent_json(&transport.wait_for_sent(1, WAIT).await.unwrap());
    assert_eq!(
        sent,
        vec![r#"{"message_type":"ack","to":"dev9","message_id":"m-9"}"#.to_string()]
    );

    let metrics = mgr.metrics();
    assert_eq!(
        metrics.stanza_errors.get(&[("code", "MALFORMED_ENVELOPE")]),
        1
    );
    assert_eq!(metrics.stanza_errors.get(&[("code", "INVALID_PAYLOAD")]), 1);
    assert_eq!(mgr.state(), LinkState::Connected);
}

#[tokio::test]
async fn send_data_emits_requested_fields() {
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();

    let mut payload = BTreeMap::new();
    payload.insert("k".to_string(), "v".to_string());
    let opts = SendOptions {
        collapse_key: None,
        time_to_live: Some(60),
        delay_while_idle: Some(false),
    };
    let id = mgr.send_data("dev1", &payload, &opts).await.unwrap();
    assert!(id.starts_with("m-"));

    let sent = sent_json(&transport.wait_for_sent(1, WAIT).await.unwrap());
    assert_eq!(
        sent[0],
        format!(r#"{{"to":"dev1","time_to_live":60,"message_id":"{id}","data":{{"k":"v"}}}}"#)
    );
}

#[tokio::test]
async fn lifecycle_events_drive_state_and_listener() {
    let transport = Arc::new(MemoryTransport::new());
    let listener = Arc::new(RecordingListener::default());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .listener(listener.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();

    transport.emit(TransportEvent::ReconnectingIn(5)).await.unwrap();
    wait_state(&mgr, LinkState::Reconnecting).await;

    let err = mgr.send("{}").await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_CONNECTED");

    transport
        .emit(TransportEvent::ReconnectFailed("refused".into()))
        .await
        .unwrap();
    transport.emit(TransportEvent::ReconnectSucceeded).await.unwrap();
    wait_state(&mgr, LinkState::Connected).await;

    transport.drop_connection("stream reset").await;
    wait_state(&mgr, LinkState::Reconnecting).await;

    eventually(|| listener.snapshot().len() == 6).await;
    assert_eq!(
        listener.snapshot(),
        vec![
            "connected",
            "authenticated",
            "reconnecting:5",
            "reconnect_failed:refused",
            "reconnect_succeeded",
            "closed_on_error:stream reset",
        ]
    );
    assert_eq!(
        mgr.metrics()
            .lifecycle_events
            .get(&[("event", "reconnecting")]),
        1
    );
}

#[tokio::test]
async fn error_close_without_reconnect_is_final() {
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg("session:\n  reconnect: false"), transport.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();
    assert!(!transport.last_params().await.unwrap().reconnect);

    transport.drop_connection("stream reset").await;
    tokio::time::timeout(WAIT, mgr.wait_closed()).await.unwrap();
    assert_eq!(mgr.state(), LinkState::Closed);
}

#[tokio::test]
async fn register_action_writes_registry_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids.txt");
    let extra = format!("registry:\n  path: \"{}\"", path.display());

    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg(&extra), transport.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();

    transport
        .deliver_xml(
            r#"<message><gcm xmlns="google:mobile:data">{"from":"reg-42","message_id":"m-2","data":{"ACTION":"REGISTER"}}</gcm></message>"#,
        )
        .await
        .unwrap();
    transport.wait_for_sent(1, WAIT).await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "reg-42\n");
}

#[tokio::test]
async fn stalled_login_times_out() {
    let transport = Arc::new(MemoryTransport::new().hang_login());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .build()
        .unwrap();

    let err = tokio::time::timeout(Duration::from_secs(3), mgr.connect_from_config())
        .await
        .expect("connect must not hang")
        .unwrap_err();
    assert_eq!(err.code().as_str(), "CONNECT_FAILED");
    assert!(err.to_string().contains("timeout"));
    assert_eq!(mgr.state(), LinkState::Closed);
    assert!(!transport.is_connected().await);

    tokio::time::timeout(Duration::from_secs(1), mgr.close())
        .await
        .expect("close must not hang");
}

#[tokio::test]
async fn close_cancels_pending_connect() {
    let transport = Arc::new(MemoryTransport::new().hang_login());
    let mgr = Arc::new(
        SessionManager::builder(cfg(""), transport.clone())
            .build()
            .unwrap(),
    );

    let pending = {
        let mgr = Arc::clone(&mgr);
        tokio::spawn(async move { mgr.connect_from_config().await })
    };
    wait_state(&mgr, LinkState::Connecting).await;
    eventually(|| mgr.metrics().lifecycle_events.get(&[("event", "connected")]) == 1).await;

    let err = mgr.send("{}").await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_CONNECTED");

    tokio::time::timeout(Duration::from_millis(500), mgr.close())
        .await
        .expect("close must not wait for login");
    let err = tokio::time::timeout(Duration::from_millis(500), pending)
        .await
        .expect("connect must return once closed")
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_CONNECTED");
    assert_eq!(mgr.state(), LinkState::Closed);
    assert!(!transport.is_connected().await);
}

/// Holds the dispatch open until released, then tries to reply.
#[derive(Default)]
struct SlowHandler {
    started: tokio::sync::Notify,
    release: tokio::sync::Notify,
    reply: Mutex<Option<String>>,
}

#[async_trait]
impl MessageHandler for SlowHandler {
    async fn handle_data(&self, ctx: &DispatchCtx, msg: &UpstreamData) -> Result<()> {
        self.started.notify_one();
        self.release.notified().await;
        let outcome = match ctx.send(format!(r#"{{"to":"{}"}}"#, msg.from)).await {
            Ok(()) => "sent".to_string(),
            Err(e) => e.code().as_str().to_string(),
        };
        *self.reply.lock().unwrap() = Some(outcome);
        Ok(())
    }
}

#[tokio::test]
async fn close_drops_queued_sends_but_finishes_running_dispatch() {
    let transport = Arc::new(MemoryTransport::new().delay_send(Duration::from_millis(300)));
    let handler = Arc::new(SlowHandler::default());
    let mgr = SessionManager::builder(cfg(""), transport.clone())
        .handler(handler.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();

    transport
        .deliver_xml(
            r#"<message><gcm xmlns="google:mobile:data">{"from":"dev1","message_id":"m-1","data":{}}</gcm></message>"#,
        )
        .await
        .unwrap();
    tokio::time::timeout(WAIT, handler.started.notified())
        .await
        .expect("dispatch started");

    for i in 0..3 {
        mgr.send(format!(r#"{{"to":"dev{i}"}}"#)).await.unwrap();
    }
    mgr.close().await;
    handler.release.notify_one();

    eventually(|| handler.reply.lock().unwrap().is_some()).await;
    assert_eq!(handler.reply.lock().unwrap().as_deref(), Some("NOT_CONNECTED"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(transport.sent().await.is_empty());
    assert_eq!(mgr.metrics().stanzas_sent.get(&[]), 0);
}

#[tokio::test]
async fn reconnect_after_server_close() {
    let transport = Arc::new(MemoryTransport::new());
    let mgr = SessionManager::builder(cfg("session:\n  reconnect: false"), transport.clone())
        .build()
        .unwrap();
    mgr.connect_from_config().await.unwrap();

    transport.drop_connection("stream reset").await;
    tokio::time::timeout(WAIT, mgr.wait_closed()).await.unwrap();

    mgr.connect_from_config().await.unwrap();
    assert_eq!(mgr.state(), LinkState::Connected);

    mgr.send(r#"{"to":"dev1"}"#).await.unwrap();
    transport.wait_for_sent(1, WAIT).await.unwrap();
}
