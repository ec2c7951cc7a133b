//! XMPP message stanza carrying extension elements (no `<body>`).
//!
//! Parsing rules:
//! - Only the root `<message>` and its direct children are interpreted.
//!   Deeper elements are skipped.
//! - A child's namespace is resolved through the in-scope declarations, so a
//!   prefixed `<g:gcm xmlns:g="...">` and a default `xmlns` are equivalent.
//! - Character content of a child is unescaped (XML entities, CDATA), which is
//!   the only transformation the stream protocol applies to element text.
//! - Any XML syntax error maps to `MalformedEnvelope`; nothing panics.

use std::fmt;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::{CcsError, Result};
use crate::protocol::envelope::WireElement;

/// A message stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stanza {
    pub id: Option<String>,
    pub to: Option<String>,
    pub from: Option<String>,
    /// `type` attribute (e.g. `normal`, `error`).
    pub kind: Option<String>,
    pub extensions: Vec<WireElement>,
}

impl Stanza {
    /// Stanza whose only child is `el`.
    pub fn with_extension(el: WireElement) -> Self {
        Self {
            extensions: vec![el],
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// First extension element with the given namespace.
    pub fn extension(&self, namespace: &str) -> Option<&WireElement> {
        self.extensions.iter().find(|e| e.namespace == namespace)
    }

    /// Serialize as `<message ...>` followed by the extension elements.
    pub fn to_xml(&self) -> String {
        let mut buf = String::from("<message");
        push_attr(&mut buf, "id", self.id.as_deref());
        push_attr(&mut buf, "type", self.kind.as_deref());
        push_attr(&mut buf, "to", self.to.as_deref());
        push_attr(&mut buf, "from", self.from.as_deref());
        buf.push('>');
        for el in &self.extensions {
            buf.push_str(&el.to_xml());
        }
        buf.push_str("</message>");
        buf
    }

    /// Parse a single `<message>` stanza.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stanza: Option<Stanza> = None;
        let mut current: Option<WireElement> = None;
        let mut depth = 0usize;

        loop {
            match reader.read_resolved_event() {
                Ok((ns, Event::Start(e))) => {
                    depth += 1;
                    match depth {
                        1 => stanza = Some(root_from(&e)?),
                        2 => current = Some(element_from(ns, &e)?),
                        _ => {}
                    }
                }
                Ok((ns, Event::Empty(e))) => match depth {
                    0 => return root_from(&e),
                    1 => {
                        if let Some(s) = stanza.as_mut() {
                            s.extensions.push(element_from(ns, &e)?);
                        }
                    }
                    _ => {}
                },
                Ok((_, Event::Text(t))) => {
                    if depth == 2 {
                        if let Some(el) = current.as_mut() {
                            let text = t.unescape().map_err(malformed)?;
                            el.text.get_or_insert_with(String::new).push_str(&text);
                        }
                    }
                }
                Ok((_, Event::CData(c))) => {
                    if depth == 2 {
                        if let Some(el) = current.as_mut() {
                            let text = String::from_utf8_lossy(&c);
                            el.text.get_or_insert_with(String::new).push_str(&text);
                        }
                    }
                }
                Ok((_, Event::End(_))) => {
                    if depth == 2 {
                        if let (Some(s), Some(el)) = (stanza.as_mut(), current.take()) {
                            s.extensions.push(el);
                        }
                    }
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                Ok((_, Event::Eof)) => {
                    if depth != 0 {
                        return Err(CcsError::MalformedEnvelope("unterminated stanza".into()));
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(malformed(e)),
            }
        }

        stanza.ok_or_else(|| CcsError::MalformedEnvelope("no message element".into()))
    }
}

impl fmt::Display for Stanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

fn push_attr(buf: &mut String, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        buf.push(' ');
        buf.push_str(key);
        buf.push_str("=\"");
        buf.push_str(&escape(v));
        buf.push('"');
    }
}

fn malformed(e: impl fmt::Display) -> CcsError {
    CcsError::MalformedEnvelope(format!("xml: {e}"))
}

fn root_from(e: &BytesStart<'_>) -> Result<Stanza> {
    if e.local_name().as_ref() != b"message" {
        return Err(CcsError::MalformedEnvelope(format!(
            "expected message stanza, got <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        )));
    }
    let mut stanza = Stanza::default();
    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        match attr.key.as_ref() {
            b"id" => stanza.id = Some(value),
            b"to" => stanza.to = Some(value),
            b"from" => stanza.from = Some(value),
            b"type" => stanza.kind = Some(value),
            _ => {}
        }
    }
    Ok(stanza)
}

fn element_from(ns: ResolveResult<'_>, e: &BytesStart<'_>) -> Result<WireElement> {
    let namespace = match ns {
        ResolveResult::Bound(ns) => String::from_utf8_lossy(ns.as_ref()).into_owned(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => {
            return Err(CcsError::MalformedEnvelope(format!(
                "undeclared namespace prefix {}",
                String::from_utf8_lossy(&prefix)
            )))
        }
    };
    Ok(WireElement {
        namespace,
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        text: None,
    })
}
