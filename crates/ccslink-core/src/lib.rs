//! ccslink core: wire-level primitives for tunnelling CCS JSON messages inside
//! XMPP message stanzas.
//!
//! This crate defines the envelope codec, the stanza model, message builders,
//! inbound classification and the error surface shared by the client runtime.
//! It carries no runtime or transport dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed traffic surfaces as `CcsError` so a long-lived session never
//! crashes on a single bad stanza.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ConnectKind, CcsError, ErrorCode, Result};
