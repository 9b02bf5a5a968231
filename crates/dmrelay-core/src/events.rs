//! Event types for the bridge.
//!
//! Two families:
//!
//! - **[`BridgeEvent`]**: the canonical internal event produced by the
//!   envelope parser and carried on the event bus. Immutable once built.
//! - **[`DevicePayload`]**: the JSON wire shape pushed to connected device
//!   clients. Produced from a `BridgeEvent` at the fan-out boundary.
//!
//! Field values are copied verbatim from the upstream envelope; absent
//! fields stay absent (`Option`) and are omitted from serialized output.

use serde::{Deserialize, Serialize};

/// Canonical internal event published on the event bus.
///
/// Constructed only by the envelope parser; consumed by the fan-out
/// broadcaster and the message store. Exists as a transient message,
/// never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A direct message arrived upstream.
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        /// Upstream sender id (e.g. `U123`).
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        /// Resolved display name, when the lookup succeeded.
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_name: Option<String>,
        /// Message text.
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Conversation (DM channel) id.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        /// Upstream message timestamp (doubles as the message id).
        #[serde(skip_serializing_if = "Option::is_none")]
        ts: Option<String>,
        /// Envelope id the event arrived under, when present.
        #[serde(skip_serializing_if = "Option::is_none")]
        envelope_id: Option<String>,
    },
    /// A conversation's read cursor moved upstream.
    #[serde(rename_all = "camelCase")]
    ReadMarked {
        /// Conversation (DM channel) id.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        /// Read-cursor timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        ts: Option<String>,
        /// Envelope id the event arrived under, when present.
        #[serde(skip_serializing_if = "Option::is_none")]
        envelope_id: Option<String>,
    },
}

impl BridgeEvent {
    /// Get the event kind string (for logging and metrics labels).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "message_received",
            Self::ReadMarked { .. } => "read_marked",
        }
    }

    /// Conversation id, when the event carries one.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::MessageReceived { channel, .. } | Self::ReadMarked { channel, .. } => {
                channel.as_deref()
            }
        }
    }

    /// Attach a resolved display name to a `MessageReceived` event.
    ///
    /// No-op for `ReadMarked`.
    #[must_use]
    pub fn with_sender_name(mut self, name: Option<String>) -> Self {
        if let Self::MessageReceived { sender_name, .. } = &mut self {
            *sender_name = name;
        }
        self
    }
}

/// JSON payload pushed to device WebSocket connections.
///
/// Device firmware relies on the exact `type` strings and field names;
/// absent fields are omitted rather than sent as null.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DevicePayload {
    /// A DM arrived.
    #[serde(rename = "dm_received", rename_all = "camelCase")]
    DmReceived {
        /// Message id (mirrors the upstream `ts`).
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// Sender id.
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<String>,
        /// Sender display name, when resolved.
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_name: Option<String>,
        /// Message text.
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Conversation id.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        /// Upstream timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        ts: Option<String>,
    },
    /// A conversation was marked read.
    #[serde(rename = "dm_read", rename_all = "camelCase")]
    DmRead {
        /// Message id (mirrors the read-cursor `ts`).
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// Conversation id.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        /// Read-cursor timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        ts: Option<String>,
    },
}

impl DevicePayload {
    /// Map a canonical event to its device wire shape.
    #[must_use]
    pub fn from_event(event: &BridgeEvent) -> Self {
        match event {
            BridgeEvent::MessageReceived {
                sender_id,
                sender_name,
                text,
                channel,
                ts,
                ..
            } => Self::DmReceived {
                message_id: ts.clone(),
                from_user_id: sender_id.clone(),
                from_user_name: sender_name.clone(),
                text: text.clone(),
                channel: channel.clone(),
                ts: ts.clone(),
            },
            BridgeEvent::ReadMarked { channel, ts, .. } => Self::DmRead {
                message_id: ts.clone(),
                channel: channel.clone(),
                ts: ts.clone(),
            },
        }
    }

    /// Get the wire type string.
    #[must_use]
    pub fn payload_type(&self) -> &'static str {
        match self {
            Self::DmReceived { .. } => "dm_received",
            Self::DmRead { .. } => "dm_read",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
