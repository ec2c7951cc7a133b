//! Protocol modules (XMPP stanza framing + CCS JSON messages).
//!
//! Two layers live here:
//! - Framing: the `<gcm xmlns="google:mobile:data">` extension element and the
//!   message stanza that carries it.
//! - Messages: JSON builders for outbound data/ack messages and the classifier
//!   for inbound data/ack/nack payloads.
//!
//! All parsers are panic-free: malformed input is reported as `CcsError`.

pub mod envelope;
pub mod inbound;
pub mod message;
pub mod message_id;
pub mod stanza;

pub use envelope::{Envelope, EnvelopeCodec, WireElement, GCM_ELEMENT, GCM_NAMESPACE};
pub use inbound::{classify, ControlMessage, NackReceipt, Receipt, UpstreamData};
pub use message::{build_ack, build_data_message, DataMessage};
pub use message_id::MessageIdGenerator;
pub use stanza::Stanza;
