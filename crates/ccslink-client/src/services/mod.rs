//! Built-in message handlers.

pub mod echo;

pub use echo::{EchoService, ECHO_COLLAPSE_KEY, MESSAGE_KEY};
