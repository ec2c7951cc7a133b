//! Top-level facade crate for ccslink.
//!
//! Re-exports the wire-level core and the session client so users can depend on a single crate.

pub mod core {
    pub use ccslink_core::*;
}

pub mod client {
    pub use ccslink_client::*;
}
