//! Broadcast-based event bus for [`BridgeEvent`] dispatch.
//!
//! Constructed once at startup and passed by `Arc` to every component that
//! publishes or subscribes — never accessed as ambient global state, so
//! tests get a fresh bus each.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::warn;

use crate::events::BridgeEvent;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Subscriber count above which a leak warning is logged.
///
/// Purely diagnostic — the bus works fine above it.
const SUBSCRIBER_WARN_THRESHOLD: usize = 16;

/// Broadcast-based event bus.
///
/// Non-blocking: `emit` never awaits. With zero subscribers the event is
/// dropped; slow receivers lag rather than blocking the sender.
pub struct EventEmitter {
    tx: broadcast::Sender<BridgeEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Create a new bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new bus with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers. Non-blocking.
    ///
    /// Returns the number of receivers the event was delivered to;
    /// 0 means the event was dropped (no subscribers).
    pub fn emit(&self, event: BridgeEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        let rx = self.tx.subscribe();
        let count = self.tx.receiver_count();
        if count > SUBSCRIBER_WARN_THRESHOLD {
            warn!(subscribers = count, "unusually many bus subscribers, possible leak");
        }
        rx
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total number of events emitted since construction.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
