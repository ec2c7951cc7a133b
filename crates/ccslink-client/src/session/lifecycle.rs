use tracing::{info, warn};

/// Link state published by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    /// Authenticated and accepting sends.
    Connected,
    /// Transport lost; the engine is trying to restore it.
    Reconnecting,
    Closed,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Reconnecting => "reconnecting",
            LinkState::Closed => "closed",
        }
    }
}

/// Connection lifecycle observer.
///
/// Callbacks run on the session's reader task and must not block. Defaults log.
pub trait LifecycleListener: Send + Sync {
    fn on_connected(&self) {
        info!("ccs connection established");
    }

    fn on_authenticated(&self) {
        info!("ccs session authenticated");
    }

    fn on_reconnecting(&self, delay_secs: u32) {
        info!(delay_secs, "reconnecting");
    }

    fn on_reconnect_succeeded(&self) {
        info!("reconnect succeeded");
    }

    fn on_reconnect_failed(&self, error: &str) {
        warn!(%error, "reconnect failed");
    }

    fn on_closed(&self) {
        info!("connection closed");
    }

    fn on_closed_on_error(&self, error: &str) {
        warn!(%error, "connection closed on error");
    }
}

/// Listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl LifecycleListener for LoggingListener {}
