//! Metric name constants shared across crates to avoid typos.
//!
//! The recorder itself is installed by the server crate; this module only
//! owns the names so every crate labels the same series.

/// Device WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Device WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active device WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Broadcast payload drops total (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Envelopes received from the realtime channel (counter).
pub const ENVELOPES_RECEIVED_TOTAL: &str = "envelopes_received_total";
/// Envelopes dropped as duplicates (counter).
pub const ENVELOPES_DUPLICATE_TOTAL: &str = "envelopes_duplicate_total";
/// Envelopes ignored as not actionable (counter).
pub const ENVELOPES_IGNORED_TOTAL: &str = "envelopes_ignored_total";
/// Canonical events published on the bus (counter, label: kind).
pub const BRIDGE_EVENTS_PUBLISHED_TOTAL: &str = "bridge_events_published_total";
/// Socket Mode connection failures (counter).
pub const SOCKET_CONNECT_FAILURES_TOTAL: &str = "socket_connect_failures_total";
