//! ccslink client library entry.
//!
//! This crate wires the transport, extension registry, dispatcher, session
//! manager and built-in services into a single CCS client. It is consumed by
//! embedding applications and by integration tests.

pub mod config;
pub mod dispatch;
pub mod obs;
pub mod registry;
pub mod services;
pub mod session;
pub mod transport;

pub use dispatch::{DispatchCtx, Dispatcher, MessageHandler};
pub use session::{
    LifecycleListener, LinkState, LoggingListener, Outbound, SendOptions, SessionManager,
};
pub use transport::{ExtensionRegistry, MemoryTransport, Transport, TransportEvent};
