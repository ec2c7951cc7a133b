use async_trait::async_trait;

use ccslink_core::error::Result;
use ccslink_core::protocol::{build_data_message, UpstreamData};

use crate::dispatch::{DispatchCtx, MessageHandler};

/// Reply key written into echoed payloads.
pub const MESSAGE_KEY: &str = "SERVER_MESSAGE";
/// Collapse key used for echo replies.
pub const ECHO_COLLAPSE_KEY: &str = "echo:CollapseKey";

const ACTION_KEY: &str = "ACTION";
const CLIENT_MESSAGE_KEY: &str = "CLIENT_MESSAGE";

/// Default handler set: `ACTION=ECHO` replies to the sender with the payload
/// plus `SERVER_MESSAGE`; `ACTION=REGISTER` records the sender's id. Other
/// actions pass through (the dispatcher still acks them).
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoService;

impl EchoService {
    pub fn new() -> Self {
        Self
    }

    async fn echo(&self, ctx: &DispatchCtx, msg: &UpstreamData) -> Result<()> {
        let client_message = msg
            .data
            .get(CLIENT_MESSAGE_KEY)
            .map(String::as_str)
            .unwrap_or_default();

        let mut payload = msg.data.clone();
        payload.insert(MESSAGE_KEY.to_string(), format!("ECHO: {client_message}"));

        let message_id = ctx.next_message_id();
        let json = build_data_message(
            &msg.from,
            &message_id,
            &payload,
            Some(ECHO_COLLAPSE_KEY),
            None,
            None,
        )?;
        tracing::debug!(to = %msg.from, %message_id, "echo reply");
        ctx.send(json).await
    }

    async fn register(&self, ctx: &DispatchCtx, msg: &UpstreamData) {
        if let Err(e) = ctx.registry().append(&msg.from).await {
            tracing::warn!(code = e.code().as_str(), error = %e, from = %msg.from, "registration not recorded");
        }
    }
}

#[async_trait]
impl MessageHandler for EchoService {
    async fn handle_data(&self, ctx: &DispatchCtx, msg: &UpstreamData) -> Result<()> {
        match msg.data.get(ACTION_KEY).map(String::as_str) {
            Some("ECHO") => self.echo(ctx, msg).await,
            Some("REGISTER") => {
                self.register(ctx, msg).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
