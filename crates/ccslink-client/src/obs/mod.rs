//! Observability: tracing bootstrap and in-process counters.
//!
//! Counters are label-keyed atomics in a `DashMap`, rendered in Prometheus
//! text format by `ClientMetrics::render`. Exporting them is left to the
//! embedding process.

pub mod metrics;

use tracing_subscriber::{fmt, EnvFilter};

pub use metrics::{ClientMetrics, CounterVec};

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = fmt().with_env_filter(EnvFilter::from_default_env()).try_init();
}
