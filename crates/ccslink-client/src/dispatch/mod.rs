//! Dispatcher module exports.
//!
//! Re-exports the dispatcher, the handler capability trait and the per-message
//! context so downstream consumers can depend on this module directly.

pub mod context;
pub mod dispatcher;

pub use context::DispatchCtx;
pub use dispatcher::{Dispatcher, MessageHandler};
