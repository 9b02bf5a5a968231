//! # dmrelay-server
//!
//! Device-facing gateway for the DM relay. Fans bus events out to
//! WebSocket-connected hardware clients and serves the local admin API.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`broadcast`] | Connection registry and fire-and-forget fan-out |
//! | [`connection`] | Per-socket upgrade, read/write loops, device frames |
//! | [`event_bridge`] | Bus subscriber feeding the store and broadcaster |
//! | [`metrics`] | Prometheus recorder and metric name constants |
//! | [`routes`] | Device and admin routers |
//! | [`store`] | Ephemeral message store behind the admin API |

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use dmrelay_core::bus::EventEmitter;
use dmrelay_slack::UpstreamListener;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub mod broadcast;
pub mod connection;
pub mod event_bridge;
pub mod metrics;
pub mod routes;
pub mod store;

use broadcast::Broadcaster;
use store::MessageStore;

/// Shared handler state for both routers.
#[derive(Clone)]
pub struct GatewayState {
    /// Device connection registry and fan-out.
    pub broadcaster: Arc<Broadcaster>,
    /// Recent DM records for the admin API.
    pub store: Arc<MessageStore>,
    /// Upstream operations (mark read, send).
    pub listener: Arc<UpstreamListener>,
    /// Canonical event bus.
    pub bus: Arc<EventEmitter>,
    /// Prometheus render handle; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Bind and serve the device WebSocket port until `shutdown` fires.
///
/// A successful bind flips the broadcaster to started; a failed bind is
/// logged and leaves the broadcaster inert, so upstream events keep
/// flowing into the store without fan-out. The rest of the service keeps
/// running either way.
pub async fn run_device_gateway(
    state: GatewayState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            state.broadcaster.mark_started();
            info!(%addr, "device gateway listening");
            listener
        }
        Err(e) => {
            error!(%addr, error = %e, "device gateway bind failed, fan-out disabled");
            return;
        }
    };
    let app = routes::device_router(state);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        error!(error = %e, "device gateway exited with error");
    }
}

/// Bind and serve the admin port until `shutdown` fires.
pub async fn run_admin_server(state: GatewayState, addr: SocketAddr, shutdown: CancellationToken) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(%addr, "admin server listening");
            listener
        }
        Err(e) => {
            error!(%addr, error = %e, "admin server bind failed");
            return;
        }
    };
    let app = routes::admin_router(state);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        error!(error = %e, "admin server exited with error");
    }
}
