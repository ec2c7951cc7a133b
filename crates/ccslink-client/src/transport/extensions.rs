//! Extension codec registry.
//!
//! Keyed by `(namespace, element)`; re-registering a key replaces the codec.
//! The session manager seals the registry on connect, after which it is
//! read-only for the life of the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use ccslink_core::error::{CcsError, Result};
use ccslink_core::protocol::{Envelope, EnvelopeCodec, Stanza};

#[derive(Default)]
pub struct ExtensionRegistry {
    codecs: DashMap<(String, String), Arc<EnvelopeCodec>>,
    sealed: AtomicBool,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            codecs: DashMap::new(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Registry holding a single codec.
    pub fn with_codec(codec: EnvelopeCodec) -> Self {
        let reg = Self::new();
        reg.codecs.insert(key_of(&codec), Arc::new(codec));
        reg
    }

    pub fn register(&self, codec: EnvelopeCodec) -> Result<()> {
        if self.is_sealed() {
            return Err(CcsError::Config(format!(
                "extension registry is sealed; cannot register {{{}}}{}",
                codec.namespace(),
                codec.element()
            )));
        }
        if self.codecs.insert(key_of(&codec), Arc::new(codec)).is_some() {
            tracing::debug!("extension codec replaced");
        }
        Ok(())
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn get(&self, namespace: &str, element: &str) -> Option<Arc<EnvelopeCodec>> {
        self.codecs
            .get(&(namespace.to_string(), element.to_string()))
            .map(|e| Arc::clone(e.value()))
    }

    pub fn registered(&self) -> Vec<(String, String)> {
        self.codecs.iter().map(|e| e.key().clone()).collect()
    }

    /// Decode the first extension element that has a registered codec.
    pub fn decode(&self, stanza: &Stanza) -> Result<Envelope> {
        for el in &stanza.extensions {
            if let Some(codec) = self.get(&el.namespace, &el.name) {
                return codec.decode(el);
            }
        }
        Err(CcsError::MalformedEnvelope(
            "stanza carries no registered extension".into(),
        ))
    }
}

fn key_of(codec: &EnvelopeCodec) -> (String, String) {
    (codec.namespace().to_string(), codec.element().to_string())
}
