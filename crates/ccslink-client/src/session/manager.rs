use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use ccslink_core::error::{CcsError, ConnectKind, Result};
use ccslink_core::protocol::{DataMessage, EnvelopeCodec, MessageIdGenerator, Stanza};

use crate::config::ClientConfig;
use crate::dispatch::{DispatchCtx, Dispatcher, MessageHandler};
use crate::obs::ClientMetrics;
use crate::registry::{FileRegistry, RegistrationRegistry};
use crate::services::EchoService;
use crate::session::outbound::{run_writer, Outbound};
use crate::session::{LifecycleListener, LinkState, LoggingListener};
use crate::transport::{ConnectParams, ExtensionRegistry, Transport, TransportEvent};

/// Optional downstream fields for `SessionManager::send_data`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub collapse_key: Option<String>,
    pub time_to_live: Option<u64>,
    pub delay_while_idle: Option<bool>,
}

/// Builder; everything except config and transport has a default.
pub struct SessionManagerBuilder {
    cfg: ClientConfig,
    transport: Arc<dyn Transport>,
    handler: Option<Arc<dyn MessageHandler>>,
    registry: Option<Arc<dyn RegistrationRegistry>>,
    listener: Option<Arc<dyn LifecycleListener>>,
    extensions: Option<Arc<ExtensionRegistry>>,
    ids: Option<MessageIdGenerator>,
}

impl SessionManagerBuilder {
    pub fn handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistrationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn message_ids(mut self, ids: MessageIdGenerator) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<SessionManager> {
        self.cfg.validate()?;

        let ext = &self.cfg.extension;
        let codec = EnvelopeCodec::new(ext.namespace.clone(), ext.element.clone());
        let extensions = self.extensions.unwrap_or_default();
        if extensions.get(codec.namespace(), codec.element()).is_none() {
            extensions.register(codec.clone())?;
        }

        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(EchoService::new()));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(FileRegistry::new(self.cfg.registry.path.clone())));
        let (state_tx, _) = watch::channel(LinkState::Disconnected);

        Ok(SessionManager {
            transport: self.transport,
            codec: Arc::new(codec),
            extensions,
            dispatcher: Arc::new(Dispatcher::new(handler)),
            registry,
            listener: self.listener.unwrap_or_else(|| Arc::new(LoggingListener)),
            ids: self.ids.unwrap_or_default(),
            metrics: Arc::new(ClientMetrics::default()),
            state: Arc::new(state_tx),
            generation: Arc::new(AtomicU64::new(0)),
            slot: Mutex::new(Slot::Idle),
            cfg: self.cfg,
        })
    }
}

struct Session {
    outbound: Outbound,
    writer: JoinHandle<()>,
}

/// What the manager currently owns. The lock is never held across a
/// transport call.
enum Slot {
    Idle,
    /// A `connect` call is between stream setup and login.
    Connecting,
    Open(Session),
}

/// Owns the single CCS session.
pub struct SessionManager {
    cfg: ClientConfig,
    transport: Arc<dyn Transport>,
    codec: Arc<EnvelopeCodec>,
    extensions: Arc<ExtensionRegistry>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<dyn RegistrationRegistry>,
    listener: Arc<dyn LifecycleListener>,
    ids: MessageIdGenerator,
    metrics: Arc<ClientMetrics>,
    state: Arc<watch::Sender<LinkState>>,
    /// Bumped on every connect and close; stale reader tasks and abandoned
    /// connect attempts stop touching `state`.
    generation: Arc<AtomicU64>,
    slot: Mutex<Slot>,
}

impl SessionManager {
    pub fn builder(cfg: ClientConfig, transport: Arc<dyn Transport>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            cfg,
            transport,
            handler: None,
            registry: None,
            listener: None,
            extensions: None,
            ids: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> Arc<ClientMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn extensions(&self) -> Arc<ExtensionRegistry> {
        Arc::clone(&self.extensions)
    }

    pub fn next_message_id(&self) -> String {
        self.ids.next()
    }

    /// Connect with the credentials from config.
    pub async fn connect_from_config(&self) -> Result<()> {
        let username = self.cfg.auth.username();
        let credential = self.cfg.auth.credential()?;
        self.connect(&username, &credential).await
    }

    /// Open the stream, start the reader/writer tasks and authenticate.
    ///
    /// Stream setup and login are each bounded by `connect_timeout_ms`.
    /// Failures are terminal for this call; nothing is retried here. A
    /// concurrent `close()` cancels the attempt.
    pub async fn connect(&self, username: &str, credential: &str) -> Result<()> {
        let generation = {
            let mut slot = self.slot.lock().await;
            match &*slot {
                Slot::Connecting => {
                    return Err(CcsError::Internal("connect already in progress".into()))
                }
                // The transport closed the link on its own; drop the leftovers.
                Slot::Open(session) if self.state() == LinkState::Closed => {
                    session.writer.abort();
                }
                Slot::Open(_) => return Err(CcsError::Internal("session already open".into())),
                Slot::Idle => {}
            }
            *slot = Slot::Connecting;
            self.extensions.seal();
            self.state.send_replace(LinkState::Connecting);
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        };

        let server = &self.cfg.server;
        let params = ConnectParams::ccs(server.host.clone(), server.port, self.cfg.session.reconnect);
        tracing::info!(host = %params.host, port = params.port, "connecting to ccs");

        let events = match self.bounded("connect", self.transport.connect(&params)).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(code = e.code().as_str(), error = %e, "connect failed");
                self.abandon(generation, LinkState::Disconnected).await;
                return Err(e);
            }
        };

        let (out_tx, out_rx) = mpsc::channel::<Stanza>(self.cfg.session.outbound_queue);
        let outbound = Outbound::new(out_tx, self.state.subscribe(), Arc::clone(&self.codec));
        let writer = tokio::spawn(run_writer(
            Arc::clone(&self.transport),
            out_rx,
            Arc::clone(&self.metrics),
        ));

        let reader = Reader {
            ctx: DispatchCtx::new(outbound.clone(), self.ids.clone(), Arc::clone(&self.registry)),
            dispatcher: Arc::clone(&self.dispatcher),
            extensions: Arc::clone(&self.extensions),
            listener: Arc::clone(&self.listener),
            metrics: Arc::clone(&self.metrics),
            state: Arc::clone(&self.state),
            current: Arc::clone(&self.generation),
            generation,
            reconnect: self.cfg.session.reconnect,
        };
        tokio::spawn(reader.run(events));

        if let Err(e) = self.bounded("login", self.transport.login(username, credential)).await {
            tracing::warn!(code = e.code().as_str(), error = %e, %username, "login failed");
            writer.abort();
            self.transport.close().await;
            self.abandon(generation, LinkState::Closed).await;
            return Err(e);
        }

        let mut slot = self.slot.lock().await;
        if self.generation.load(Ordering::Acquire) != generation {
            drop(slot);
            writer.abort();
            self.transport.close().await;
            return Err(CcsError::NotConnected);
        }
        self.state.send_replace(LinkState::Connected);
        *slot = Slot::Open(Session { outbound, writer });
        tracing::info!(%username, "ccs session ready");
        Ok(())
    }

    /// Run one transport step under the connect timeout, giving up early if
    /// the link is closed meanwhile.
    async fn bounded<T>(&self, step: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.cfg.server.connect_timeout();
        let mut closed = self.state.subscribe();
        tokio::select! {
            res = tokio::time::timeout(timeout, fut) => res.unwrap_or_else(|_| {
                Err(CcsError::connect(
                    ConnectKind::Timeout,
                    format!("{step} not done after {}ms", self.cfg.server.connect_timeout_ms),
                ))
            }),
            _ = closed.wait_for(|s| *s == LinkState::Closed) => {
                tracing::info!(%step, "link closed while connecting");
                Err(CcsError::NotConnected)
            }
        }
    }

    /// Release the slot after a failed attempt, unless a `close()` already
    /// took it over.
    async fn abandon(&self, generation: u64, next: LinkState) {
        let mut slot = self.slot.lock().await;
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Slot::Idle;
            self.state.send_replace(next);
        }
    }

    /// Queue one JSON message. Fails with `NotConnected` unless the session is
    /// authenticated; nothing is buffered across disconnects.
    pub async fn send(&self, json: impl Into<String>) -> Result<()> {
        let outbound = match &*self.slot.lock().await {
            Slot::Open(session) => session.outbound.clone(),
            _ => return Err(CcsError::NotConnected),
        };
        outbound.send(json.into()).await
    }

    /// Build and send a downstream data message; returns its fresh message id.
    pub async fn send_data(
        &self,
        to: &str,
        payload: &BTreeMap<String, String>,
        opts: &SendOptions,
    ) -> Result<String> {
        let message_id = self.next_message_id();
        let json = DataMessage::new(to, &message_id, payload)
            .collapse_key(opts.collapse_key.as_deref())
            .time_to_live(opts.time_to_live)
            .delay_while_idle(opts.delay_while_idle)
            .to_json()?;
        self.send(json).await?;
        Ok(message_id)
    }

    /// Close the session. Queued sends are dropped; an inbound dispatch that
    /// is already running finishes on its own. A pending `connect` is
    /// cancelled and returns an error.
    pub async fn close(&self) {
        let session = {
            let mut slot = self.slot.lock().await;
            let session = match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Idle => return,
                Slot::Connecting => None,
                Slot::Open(session) => Some(session),
            };
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.state.send_replace(LinkState::Closed);
            session
        };

        if let Some(session) = session {
            session.writer.abort();
            self.transport.close().await;
        }
        tracing::info!("ccs session closed");
    }

    /// Resolve once the link reaches `Closed`.
    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == LinkState::Closed).await;
    }
}

/// Inbound side of one session: transport events in arrival order.
struct Reader {
    ctx: DispatchCtx,
    dispatcher: Arc<Dispatcher>,
    extensions: Arc<ExtensionRegistry>,
    listener: Arc<dyn LifecycleListener>,
    metrics: Arc<ClientMetrics>,
    state: Arc<watch::Sender<LinkState>>,
    current: Arc<AtomicU64>,
    generation: u64,
    reconnect: bool,
}

impl Reader {
    async fn run(self, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            if !matches!(event, TransportEvent::Stanza(_)) {
                self.metrics
                    .lifecycle_events
                    .inc(&[("event", event.label())]);
            }
            match event {
                TransportEvent::Stanza(stanza) => self.process(stanza).await,
                TransportEvent::Connected => self.listener.on_connected(),
                TransportEvent::Authenticated => {
                    self.set_state(LinkState::Connected);
                    self.listener.on_authenticated();
                }
                TransportEvent::ReconnectingIn(secs) => {
                    self.set_state(LinkState::Reconnecting);
                    self.listener.on_reconnecting(secs);
                }
                TransportEvent::ReconnectSucceeded => {
                    self.set_state(LinkState::Connected);
                    self.listener.on_reconnect_succeeded();
                }
                TransportEvent::ReconnectFailed(error) => {
                    self.listener.on_reconnect_failed(&error);
                }
                TransportEvent::Closed => {
                    self.set_state(LinkState::Closed);
                    self.listener.on_closed();
                }
                TransportEvent::ClosedOnError(error) => {
                    self.set_state(if self.reconnect {
                        LinkState::Reconnecting
                    } else {
                        LinkState::Closed
                    });
                    self.listener.on_closed_on_error(&error);
                }
            }
        }
        tracing::debug!(generation = self.generation, "transport event stream ended");
    }

    async fn process(&self, stanza: Stanza) {
        self.metrics.stanzas_received.inc(&[]);
        tracing::info!(xml = %stanza, "stanza received");

        match self
            .dispatcher
            .dispatch_stanza(&self.ctx, &self.extensions, &stanza)
            .await
        {
            Ok(kind) => self.metrics.inbound_messages.inc(&[("kind", kind)]),
            Err(e) => {
                self.metrics
                    .stanza_errors
                    .inc(&[("code", e.code().as_str())]);
                tracing::warn!(code = e.code().as_str(), error = %e, "stanza dropped");
            }
        }
    }

    fn set_state(&self, next: LinkState) {
        if self.current.load(Ordering::Acquire) == self.generation {
            self.state.send_replace(next);
        }
    }
}
