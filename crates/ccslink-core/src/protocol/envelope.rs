//! CCS envelope: one JSON document carried as the text of a namespaced
//! extension element.
//!
//! `EnvelopeCodec::encode` keeps the JSON verbatim; the producer owns its
//! well-formedness and nothing is validated on the way out. Rendering to XML
//! escapes `<`, `>` and `&` in the element text, which `Stanza::parse` undoes,
//! so the JSON that reaches the peer is byte-identical to what was encoded.

use std::fmt;

use quick_xml::escape::{escape, partial_escape};

use crate::error::{CcsError, Result};
use crate::protocol::stanza::Stanza;

/// Namespace of the CCS extension element.
pub const GCM_NAMESPACE: &str = "google:mobile:data";
/// Local name of the CCS extension element.
pub const GCM_ELEMENT: &str = "gcm";

/// Decoded envelope content. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    raw_json: String,
}

impl Envelope {
    pub fn new(raw_json: impl Into<String>) -> Self {
        Self {
            raw_json: raw_json.into(),
        }
    }

    pub fn json(&self) -> &str {
        &self.raw_json
    }

    pub fn into_json(self) -> String {
        self.raw_json
    }
}

/// A single extension element inside a stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireElement {
    /// Value of the element's `xmlns` attribute.
    pub namespace: String,
    /// Local element name.
    pub name: String,
    /// Character content; `None` when the element is empty.
    pub text: Option<String>,
}

impl WireElement {
    /// Render as `<name xmlns="ns">text</name>` with XML-escaped text.
    pub fn to_xml(&self) -> String {
        let ns = escape(self.namespace.as_str());
        match &self.text {
            Some(text) => format!(
                "<{name} xmlns=\"{ns}\">{text}</{name}>",
                name = self.name,
                text = partial_escape(text.as_str()),
            ),
            None => format!("<{} xmlns=\"{ns}\"/>", self.name),
        }
    }
}

impl fmt::Display for WireElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

/// Codec for one `(namespace, element)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeCodec {
    namespace: String,
    element: String,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(GCM_NAMESPACE, GCM_ELEMENT)
    }
}

impl EnvelopeCodec {
    pub fn new(namespace: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            element: element.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    /// Wrap a JSON document in the extension element.
    pub fn encode(&self, json: impl Into<String>) -> WireElement {
        WireElement {
            namespace: self.namespace.clone(),
            name: self.element.clone(),
            text: Some(json.into()),
        }
    }

    /// Build an outbound stanza whose only child is the extension element.
    pub fn wrap(&self, json: impl Into<String>) -> Stanza {
        Stanza::with_extension(self.encode(json))
    }

    /// Extract the JSON text of a matching element.
    pub fn decode(&self, el: &WireElement) -> Result<Envelope> {
        if el.namespace != self.namespace || el.name != self.element {
            return Err(CcsError::MalformedEnvelope(format!(
                "unexpected element {{{}}}{}",
                el.namespace, el.name
            )));
        }
        let text = el.text.as_ref().ok_or_else(|| {
            CcsError::MalformedEnvelope(format!("{} element has no content", self.element))
        })?;
        Ok(Envelope::new(text.clone()))
    }

    /// Find this codec's element in a stanza and decode it.
    pub fn decode_stanza(&self, stanza: &Stanza) -> Result<Envelope> {
        let el = stanza.extension(&self.namespace).ok_or_else(|| {
            CcsError::MalformedEnvelope(format!("stanza has no {} extension", self.namespace))
        })?;
        self.decode(el)
    }
}
