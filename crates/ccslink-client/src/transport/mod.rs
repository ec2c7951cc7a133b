//! Transport layer (streaming XMPP engine boundary).
//!
//! The engine itself (TCP/TLS, stream negotiation, SASL, stanza I/O) sits
//! behind the `Transport` trait. The session manager only needs to connect,
//! log in, write stanzas, close, and consume a stream of `TransportEvent`s.

pub mod extensions;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ccslink_core::error::Result;
use ccslink_core::protocol::Stanza;

pub use extensions::ExtensionRegistry;
pub use memory::MemoryTransport;

/// Transport security requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// TLS is mandatory; plaintext is never negotiated.
    Required,
}

/// Connection parameters handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub security: SecurityMode,
    /// Broadcast initial presence after login.
    pub send_presence: bool,
    /// Fetch the roster during login.
    pub roster_at_login: bool,
    /// Engine-driven reconnect after a successful login.
    pub reconnect: bool,
}

impl ConnectParams {
    /// Parameters for a CCS session: TLS required, no presence, no roster.
    pub fn ccs(host: impl Into<String>, port: u16, reconnect: bool) -> Self {
        Self {
            host: host.into(),
            port,
            security: SecurityMode::Required,
            send_presence: false,
            roster_at_login: false,
            reconnect,
        }
    }
}

/// Events surfaced by the engine, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Authenticated,
    Stanza(Stanza),
    ReconnectingIn(u32),
    ReconnectSucceeded,
    ReconnectFailed(String),
    Closed,
    ClosedOnError(String),
}

impl TransportEvent {
    pub fn label(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "connected",
            TransportEvent::Authenticated => "authenticated",
            TransportEvent::Stanza(_) => "stanza",
            TransportEvent::ReconnectingIn(_) => "reconnecting",
            TransportEvent::ReconnectSucceeded => "reconnect_succeeded",
            TransportEvent::ReconnectFailed(_) => "reconnect_failed",
            TransportEvent::Closed => "closed",
            TransportEvent::ClosedOnError(_) => "closed_on_error",
        }
    }
}

/// Streaming engine contract.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the stream (including TLS). Returns the event stream for this
    /// connection; it ends when the engine gives up on the connection.
    async fn connect(&self, params: &ConnectParams) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Authenticate on an open stream.
    async fn login(&self, username: &str, credential: &str) -> Result<()>;

    /// Write one stanza.
    async fn send_stanza(&self, stanza: Stanza) -> Result<()>;

    /// Close the stream. Idempotent.
    async fn close(&self);
}
