//! Event fan-out to connected device clients.
//!
//! Fire-and-forget, at-most-once: each payload is serialized once and
//! offered to every open connection. A closed or backpressured connection
//! is skipped without affecting the rest of the batch, and nothing is
//! retried or acknowledged.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use dmrelay_core::events::DevicePayload;
use dmrelay_core::metrics::BROADCAST_DROPS_TOTAL;
use metrics::counter;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, warn};

/// Lifetime payload drops before a slow client is forcibly disconnected.
const MAX_TOTAL_DROPS: u64 = 32;

/// One device WebSocket connection.
///
/// Payloads go through a bounded channel to the connection's write loop;
/// `send` never blocks the broadcast path.
pub struct DeviceConnection {
    /// Connection id (UUID v7, assigned at upgrade).
    pub id: String,
    tx: mpsc::Sender<Arc<String>>,
    closed: CancellationToken,
    drops: AtomicU64,
}

impl DeviceConnection {
    /// Wrap the write-loop channel of a new connection.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            drops: AtomicU64::new(0),
        }
    }

    /// Offer a payload to this connection. Returns `false` when the
    /// channel is full (drop counted) or the connection is closed.
    pub fn send(&self, payload: Arc<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Mark the connection closed. Later broadcasts skip it silently and
    /// a socket task waiting on [`DeviceConnection::closed`] wakes up.
    pub fn mark_closed(&self) {
        self.closed.cancel();
    }

    /// Resolves once the connection has been marked closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Lifetime payload drops for this connection.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Fan-out broadcaster owning the device connection set.
///
/// Inert until [`Broadcaster::mark_started`] — events published before
/// the listening socket is bound (or after a failed bind) are dropped
/// silently rather than erroring.
pub struct Broadcaster {
    connections: RwLock<HashMap<String, Arc<DeviceConnection>>>,
    active_count: AtomicUsize,
    started: AtomicBool,
}

impl Broadcaster {
    /// Create a broadcaster in the not-started state.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            started: AtomicBool::new(false),
        }
    }

    /// Record that the listening socket is bound and broadcasting is live.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Relaxed);
    }

    /// Whether the listening socket was bound.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<DeviceConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection by id.
    pub async fn remove(&self, connection_id: &str) {
        let mut conns = self.connections.write().await;
        if conns.remove(connection_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Serialize `payload` once and push it to every open connection.
    ///
    /// Per-connection failures are isolated: a full channel or a closed
    /// socket never aborts delivery to the remaining connections.
    pub async fn broadcast(&self, payload: &DevicePayload) {
        if !self.is_started() {
            debug!(payload_type = payload.payload_type(), "broadcast before start, dropped");
            return;
        }
        let json = match serde_json::to_string(payload) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                error!(payload_type = payload.payload_type(), error = %e, "failed to serialize payload");
                return;
            }
        };

        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            if conns.is_empty() {
                debug!(payload_type = payload.payload_type(), "no device connections, nothing sent");
                return;
            }
            let mut recipients = 0_u32;
            for conn in conns.values() {
                if !conn.is_open() {
                    continue;
                }
                if conn.send(Arc::clone(&json)) {
                    recipients += 1;
                } else {
                    counter!(BROADCAST_DROPS_TOTAL).increment(1);
                    let drops = conn.drop_count();
                    if !conn.is_open() || drops >= MAX_TOTAL_DROPS {
                        warn!(conn_id = %conn.id, drops, "removing dead or slow device connection");
                        // Wake the socket task so the connection actually
                        // disconnects instead of lingering half-dead.
                        conn.mark_closed();
                        to_remove.push(conn.id.clone());
                    } else {
                        debug!(conn_id = %conn.id, drops, "device channel full, payload dropped");
                    }
                }
            }
            debug!(payload_type = payload.payload_type(), recipients, "broadcast payload");
        }
        for id in &to_remove {
            self.remove(id).await;
        }
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
