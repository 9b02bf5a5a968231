//! Prometheus metrics recorder.
//!
//! The shared metric name constants live in [`dmrelay_core::metrics`] and
//! are re-exported here for handler code in this crate.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

pub use dmrelay_core::metrics::*;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Must be
/// called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}
