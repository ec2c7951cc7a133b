//! Session management for the single CCS connection.
//!
//! The manager owns at most one live session: an outbound queue with its
//! writer task, and a reader task that consumes transport events in arrival
//! order and runs the dispatcher for each stanza.

mod lifecycle;
mod manager;
mod outbound;

pub use lifecycle::{LifecycleListener, LinkState, LoggingListener};
pub use manager::{SendOptions, SessionManager, SessionManagerBuilder};
pub use outbound::Outbound;
