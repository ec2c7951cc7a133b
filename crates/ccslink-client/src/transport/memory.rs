//! In-process loopback transport.
//!
//! Records every written stanza and lets the caller play the server side:
//! inject inbound stanzas, raise lifecycle events, or make connect/login fail.
//! Used by integration tests and by embedders that want to drive a session
//! without a network.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};

use ccslink_core::error::{CcsError, ConnectKind, Result};
use ccslink_core::protocol::Stanza;

use super::{ConnectParams, Transport, TransportEvent};

const EVENT_QUEUE: usize = 256;

#[derive(Default)]
struct MemoryInner {
    events: Option<mpsc::Sender<TransportEvent>>,
    sent: Vec<Stanza>,
    last_params: Option<ConnectParams>,
    logged_in_as: Option<String>,
}

#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<MemoryInner>,
    sent_notify: Notify,
    connect_error: Option<ConnectKind>,
    connect_delay: Option<Duration>,
    send_delay: Option<Duration>,
    reject_login: bool,
    hang_login: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail with the given kind.
    pub fn fail_connect(mut self, kind: ConnectKind) -> Self {
        self.connect_error = Some(kind);
        self
    }

    /// Make `connect` take this long before succeeding.
    pub fn delay_connect(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Make `login` reject every credential.
    pub fn reject_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Make `login` never answer, like a server that stalls after TLS.
    pub fn hang_login(mut self) -> Self {
        self.hang_login = true;
        self
    }

    /// Make every `send_stanza` take this long before the write lands.
    pub fn delay_send(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.events.is_some()
    }

    pub async fn last_params(&self) -> Option<ConnectParams> {
        self.inner.lock().await.last_params.clone()
    }

    pub async fn logged_in_as(&self) -> Option<String> {
        self.inner.lock().await.logged_in_as.clone()
    }

    /// Push an inbound stanza as if the server sent it.
    pub async fn deliver(&self, stanza: Stanza) -> Result<()> {
        self.emit(TransportEvent::Stanza(stanza)).await
    }

    /// Parse and push an inbound stanza.
    pub async fn deliver_xml(&self, xml: &str) -> Result<()> {
        self.deliver(Stanza::parse(xml)?).await
    }

    /// Push a lifecycle event.
    pub async fn emit(&self, event: TransportEvent) -> Result<()> {
        let tx = self
            .inner
            .lock()
            .await
            .events
            .clone()
            .ok_or(CcsError::NotConnected)?;
        tx.send(event)
            .await
            .map_err(|_| CcsError::Internal("event receiver dropped".into()))
    }

    /// Simulate the server dropping the connection.
    pub async fn drop_connection(&self, reason: &str) {
        let tx = self.inner.lock().await.events.take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::ClosedOnError(reason.to_string())).await;
        }
    }

    /// Snapshot of everything written so far.
    pub async fn sent(&self) -> Vec<Stanza> {
        self.inner.lock().await.sent.clone()
    }

    /// Wait until at least `n` stanzas have been written.
    pub async fn wait_for_sent(&self, n: usize, limit: Duration) -> Result<Vec<Stanza>> {
        tokio::time::timeout(limit, async {
            loop {
                let notified = self.sent_notify.notified();
                {
                    let inner = self.inner.lock().await;
                    if inner.sent.len() >= n {
                        return inner.sent.clone();
                    }
                }
                notified.await;
            }
        })
        .await
        .map_err(|_| CcsError::Internal(format!("timed out waiting for {n} sent stanzas")))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, params: &ConnectParams) -> Result<mpsc::Receiver<TransportEvent>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.connect_error {
            return Err(CcsError::connect(kind, "memory transport refused connect"));
        }

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        tx.try_send(TransportEvent::Connected)
            .map_err(|_| CcsError::Internal("event queue full".into()))?;

        let mut inner = self.inner.lock().await;
        inner.events = Some(tx);
        inner.last_params = Some(params.clone());
        Ok(rx)
    }

    async fn login(&self, username: &str, _credential: &str) -> Result<()> {
        if !self.is_connected().await {
            return Err(CcsError::NotConnected);
        }
        if self.hang_login {
            std::future::pending::<()>().await;
        }
        if self.reject_login {
            return Err(CcsError::AuthFailed("not-authorized".into()));
        }
        self.inner.lock().await.logged_in_as = Some(username.to_string());
        self.emit(TransportEvent::Authenticated).await
    }

    async fn send_stanza(&self, stanza: Stanza) -> Result<()> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().await;
        if inner.events.is_none() {
            return Err(CcsError::NotConnected);
        }
        inner.sent.push(stanza);
        drop(inner);
        self.sent_notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        let tx = self.inner.lock().await.events.take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Closed).await;
        }
    }
}
