//! TTL-windowed envelope deduplication.
//!
//! The upstream realtime channel is at-least-once: retries and reconnects
//! can redeliver the same envelope. A duplicate would re-trigger fan-out
//! and spurious read-state changes, so envelope ids are remembered for a
//! bounded window and repeats inside it are dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default dedup window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Time-windowed set of recently-seen envelope ids.
///
/// Entries map id → first-seen instant and are never mutated after
/// insertion; expiry is enforced lazily on every call, so no entry
/// survives past its TTL plus one call interval. Applied uniformly to
/// both event kinds.
pub struct DedupeWindow {
    seen: HashMap<String, Instant>,
    ttl: Duration,
}

impl DedupeWindow {
    /// Create a window with the default 5-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create a window with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            ttl,
        }
    }

    /// Check whether `id` was seen inside the TTL window, recording it on
    /// first sight.
    ///
    /// Returns `true` for a repeat within the window. An empty id is never
    /// a duplicate and is never recorded — every such envelope processes.
    pub fn check_and_insert(&mut self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        let now = Instant::now();
        self.prune(now);
        if self.seen.contains_key(id) {
            return true;
        }
        let _ = self.seen.insert(id.to_owned(), now);
        false
    }

    /// Number of ids currently remembered (post-prune count from the last
    /// call; stale entries may linger until the next check).
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the window currently remembers nothing.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.seen.retain(|_, first_seen| now.duration_since(*first_seen) < ttl);
    }
}

impl Default for DedupeWindow {
    fn default() -> Self {
        Self::new()
    }
}
