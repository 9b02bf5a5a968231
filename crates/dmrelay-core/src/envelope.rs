//! Envelope parsing: untrusted wire input → canonical [`BridgeEvent`].
//!
//! The upstream realtime channel delivers events in up to three shapes:
//!
//! - wrapped: `{ envelope_id?, payload: { event: {...} } }`
//! - flattened: `{ event: {...} }`
//! - bare: the event object itself
//!
//! Parsing is a layered optional-unwrap over a dynamically-typed value
//! followed by a closed match on the `type` discriminator. It never fails
//! on shape — `None` means "not actionable", and missing fields degrade to
//! absent output fields rather than errors.
//!
//! Accepted read-cursor types are `im_marked` and `channel_marked`; both
//! map to [`BridgeEvent::ReadMarked`] (the outbound wire name is always
//! `dm_read`).

use serde_json::Value;

use crate::events::BridgeEvent;

/// Read the deduplication id from the outer envelope layer.
///
/// Prefers an explicit `envelope_id`, falling back to `event_id`. The id
/// lives on the outer layer, not the inner event, so a bare event object
/// has no id (and is therefore never deduplicated).
#[must_use]
pub fn envelope_id(raw: &Value) -> Option<String> {
    raw.get("envelope_id")
        .or_else(|| raw.get("event_id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Parse an arbitrary envelope value into a canonical event.
///
/// Returns `None` for anything that is not an actionable user DM or
/// read-cursor update: unknown types, `message` events carrying a
/// `subtype` (edits, bot messages, channel joins), or shapeless input.
#[must_use]
pub fn parse_envelope(raw: &Value) -> Option<BridgeEvent> {
    // Unwrap one optional `payload` layer, then one optional `event` layer.
    let unwrapped = raw.get("payload").unwrap_or(raw);
    let event = unwrapped.get("event").unwrap_or(unwrapped);

    let env_id = envelope_id(raw);

    match event.get("type").and_then(Value::as_str) {
        Some("message") => {
            if event.get("subtype").is_some() {
                // Edits, bot chatter, join notices — noise, not user DMs.
                return None;
            }
            Some(BridgeEvent::MessageReceived {
                sender_id: field(event, "user"),
                sender_name: None,
                text: field(event, "text"),
                channel: field(event, "channel"),
                ts: field(event, "ts"),
                envelope_id: env_id,
            })
        }
        Some("im_marked" | "channel_marked") => Some(BridgeEvent::ReadMarked {
            channel: field(event, "channel"),
            ts: field(event, "ts"),
            envelope_id: env_id,
        }),
        _ => None,
    }
}

/// Copy a string field verbatim, absent when missing or non-string.
fn field(event: &Value, name: &str) -> Option<String> {
    event.get(name).and_then(Value::as_str).map(str::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
