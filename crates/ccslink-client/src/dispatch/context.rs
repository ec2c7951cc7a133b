use std::sync::Arc;

use ccslink_core::error::Result;
use ccslink_core::protocol::MessageIdGenerator;

use crate::registry::RegistrationRegistry;
use crate::session::Outbound;

/// Per-session tools handed to message handlers.
#[derive(Clone)]
pub struct DispatchCtx {
    outbound: Outbound,
    ids: MessageIdGenerator,
    registry: Arc<dyn RegistrationRegistry>,
}

impl DispatchCtx {
    pub fn new(
        outbound: Outbound,
        ids: MessageIdGenerator,
        registry: Arc<dyn RegistrationRegistry>,
    ) -> Self {
        Self {
            outbound,
            ids,
            registry,
        }
    }

    /// Send a JSON message on the session.
    pub async fn send(&self, json: String) -> Result<()> {
        self.outbound.send(json).await
    }

    pub fn next_message_id(&self) -> String {
        self.ids.next()
    }

    pub fn registry(&self) -> &dyn RegistrationRegistry {
        self.registry.as_ref()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }
}
