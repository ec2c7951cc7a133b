use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use ccslink_core::error::Result;
use ccslink_core::protocol::{
    build_ack, classify, ControlMessage, Envelope, NackReceipt, Receipt, Stanza, UpstreamData,
};

use crate::dispatch::DispatchCtx;
use crate::transport::ExtensionRegistry;

/// Inbound message capabilities. Every method has a logging default, so an
/// implementation overrides only what it cares about.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Upstream data message. The ack is sent by the dispatcher afterwards,
    /// whatever this returns.
    async fn handle_data(&self, _ctx: &DispatchCtx, msg: &UpstreamData) -> Result<()> {
        tracing::debug!(from = %msg.from, message_id = %msg.message_id, "upstream data message");
        Ok(())
    }

    async fn handle_ack(&self, _ctx: &DispatchCtx, ack: &Receipt) {
        tracing::info!(from = %ack.from, message_id = %ack.message_id, "ack receipt");
    }

    async fn handle_nack(&self, _ctx: &DispatchCtx, nack: &NackReceipt) {
        tracing::info!(
            from = %nack.from,
            message_id = %nack.message_id,
            error = nack.error.as_deref().unwrap_or(""),
            "nack receipt"
        );
    }

    async fn handle_unrecognized(
        &self,
        _ctx: &DispatchCtx,
        message_type: &str,
        _body: &Map<String, Value>,
    ) {
        tracing::warn!(%message_type, "unrecognized message type");
    }
}

/// Fixed branching over the handler capabilities.
pub struct Dispatcher {
    handler: Arc<dyn MessageHandler>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    /// Decode the stanza's envelope, then dispatch it.
    /// Returns the message kind on success.
    pub async fn dispatch_stanza(
        &self,
        ctx: &DispatchCtx,
        extensions: &ExtensionRegistry,
        stanza: &Stanza,
    ) -> Result<&'static str> {
        let env = extensions.decode(stanza)?;
        self.dispatch(ctx, &env).await
    }

    pub async fn dispatch(&self, ctx: &DispatchCtx, env: &Envelope) -> Result<&'static str> {
        let msg = classify(env.json())?;
        let kind = msg.kind();

        match msg {
            ControlMessage::Data(data) => {
                if let Err(e) = self.handler.handle_data(ctx, &data).await {
                    tracing::warn!(
                        code = e.code().as_str(),
                        error = %e,
                        from = %data.from,
                        message_id = %data.message_id,
                        "data handler failed"
                    );
                }
                let ack = build_ack(&data.from, &data.message_id)?;
                ctx.send(ack).await?;
            }
            ControlMessage::Ack(ack) => self.handler.handle_ack(ctx, &ack).await,
            ControlMessage::Nack(nack) => self.handler.handle_nack(ctx, &nack).await,
            ControlMessage::Unrecognized { message_type, body } => {
                self.handler
                    .handle_unrecognized(ctx, &message_type, &body)
                    .await
            }
        }

        Ok(kind)
    }
}
