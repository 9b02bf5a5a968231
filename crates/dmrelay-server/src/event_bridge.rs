//! Bus subscriber task: canonical events → store + device fan-out.

use std::sync::Arc;

use dmrelay_core::bus::EventEmitter;
use dmrelay_core::events::DevicePayload;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broadcast::Broadcaster;
use crate::store::MessageStore;

/// Subscribe to the bus and forward every event to the message store and
/// the device broadcaster until `shutdown` is cancelled.
///
/// Lagging behind the bus loses events (at-most-once delivery is the
/// contract); the task logs the gap and keeps going.
pub fn spawn_event_bridge(
    bus: &Arc<EventEmitter>,
    broadcaster: Arc<Broadcaster>,
    store: Arc<MessageStore>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(event) => {
                    store.apply(&event);
                    let payload = DevicePayload::from_event(&event);
                    broadcaster.broadcast(&payload).await;
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event bridge lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("event bridge stopped");
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
