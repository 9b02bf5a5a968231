//! Service entrypoint: wires settings, the event bus, the upstream
//! listener, and both HTTP surfaces together, then waits for ctrl-c.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dmrelay_core::bus::EventEmitter;
use dmrelay_server::broadcast::Broadcaster;
use dmrelay_server::event_bridge::spawn_event_bridge;
use dmrelay_server::store::MessageStore;
use dmrelay_server::{GatewayState, run_admin_server, run_device_gateway};
use dmrelay_settings::{load_settings, load_settings_from_path};
use dmrelay_slack::{SlackApi, UpstreamListener, run_socket_mode};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "dmrelay",
    about = "Bridge upstream chat DMs to local WebSocket devices"
)]
struct Args {
    /// Settings file path (defaults to `~/.dmrelay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the device WebSocket port.
    #[arg(long)]
    device_port: Option<u16>,

    /// Override the admin HTTP port.
    #[arg(long)]
    admin_port: Option<u16>,
}

/// Initialize the global tracing subscriber with stderr output only.
///
/// `RUST_LOG` wins over the configured level. Subsequent calls are no-ops.
fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => load_settings_from_path(path)?,
        None => load_settings()?,
    };
    if let Some(port) = args.device_port {
        settings.server.device_port = port;
    }
    if let Some(port) = args.admin_port {
        settings.server.admin_port = port;
    }

    init_subscriber(&settings.logging.level);
    info!(version = %settings.version, "dmrelay starting");

    let metrics_handle = dmrelay_server::metrics::install_recorder();

    let bus = Arc::new(EventEmitter::new());
    let api = Arc::new(SlackApi::new(&settings.slack));
    let listener = Arc::new(UpstreamListener::new(
        Arc::clone(&api),
        Arc::clone(&bus),
        Duration::from_secs(settings.dedupe.ttl_secs),
        settings.slack.default_recipient.clone(),
    ));
    let broadcaster = Arc::new(Broadcaster::new());
    let store = Arc::new(MessageStore::new(Duration::from_secs(
        settings.store.retention_secs,
    )));

    let shutdown = CancellationToken::new();
    let state = GatewayState {
        broadcaster: Arc::clone(&broadcaster),
        store: Arc::clone(&store),
        listener: Arc::clone(&listener),
        bus: Arc::clone(&bus),
        metrics: Some(metrics_handle),
    };

    let bridge = spawn_event_bridge(&bus, broadcaster, store, shutdown.clone());

    let device_addr: SocketAddr = format!(
        "{}:{}",
        settings.server.bind_addr, settings.server.device_port
    )
    .parse()
    .context("invalid device listen address")?;
    let admin_addr: SocketAddr = format!(
        "{}:{}",
        settings.server.bind_addr, settings.server.admin_port
    )
    .parse()
    .context("invalid admin listen address")?;

    let device = tokio::spawn(run_device_gateway(
        state.clone(),
        device_addr,
        shutdown.clone(),
    ));
    let admin = tokio::spawn(run_admin_server(state, admin_addr, shutdown.clone()));

    let socket = if settings.slack.app_token.is_empty() || settings.slack.bot_token.is_empty() {
        warn!("upstream tokens not configured, realtime listener disabled");
        None
    } else {
        Some(tokio::spawn(run_socket_mode(
            api,
            listener,
            shutdown.clone(),
        )))
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    shutdown.cancel();

    let _ = bridge.await;
    let _ = device.await;
    let _ = admin.await;
    if let Some(task) = socket {
        let _ = task.await;
    }
    info!("dmrelay stopped");
    Ok(())
}
