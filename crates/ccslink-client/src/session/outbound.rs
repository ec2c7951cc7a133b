//! Outbound path: a bounded stanza queue drained by a single writer task.
//!
//! The writer is the only caller of `Transport::send_stanza`, so writes from
//! the application and from inbound auto-replies never interleave. Sends are
//! at-most-once: a stanza the transport rejects is logged and dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use ccslink_core::error::{CcsError, Result};
use ccslink_core::protocol::{EnvelopeCodec, Stanza};

use crate::obs::ClientMetrics;
use crate::session::LinkState;
use crate::transport::Transport;

/// Cloneable send handle for one session.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Stanza>,
    state: watch::Receiver<LinkState>,
    codec: Arc<EnvelopeCodec>,
}

impl Outbound {
    pub fn new(
        tx: mpsc::Sender<Stanza>,
        state: watch::Receiver<LinkState>,
        codec: Arc<EnvelopeCodec>,
    ) -> Self {
        Self { tx, state, codec }
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == LinkState::Connected
    }

    /// Wrap `json` in the envelope and queue it for the writer.
    pub async fn send(&self, json: String) -> Result<()> {
        if !self.is_connected() {
            return Err(CcsError::NotConnected);
        }
        let stanza = self.codec.wrap(json);
        self.tx.send(stanza).await.map_err(|_| CcsError::NotConnected)
    }
}

pub(crate) async fn run_writer(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::Receiver<Stanza>,
    metrics: Arc<ClientMetrics>,
) {
    while let Some(stanza) = rx.recv().await {
        let xml = stanza.to_xml();
        match transport.send_stanza(stanza).await {
            Ok(()) => {
                metrics.stanzas_sent.inc(&[]);
                tracing::info!(%xml, "stanza sent");
            }
            Err(e) => {
                tracing::warn!(code = e.code().as_str(), error = %e, %xml, "stanza write failed; dropped");
            }
        }
    }
    tracing::debug!("outbound writer stopped");
}
