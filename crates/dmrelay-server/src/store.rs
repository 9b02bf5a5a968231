//! Ephemeral message store.
//!
//! Service-layer view of recent DMs for the admin endpoints: id → record
//! with a `read` flag, pruned by age. Purely in-memory; losing it on
//! restart is fine because the chat platform stays the source of truth.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dmrelay_core::events::BridgeEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A stored DM record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Record id (the upstream `ts`).
    pub id: String,
    /// Sender id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user: Option<String>,
    /// Sender display name, when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    /// Message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Conversation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Upstream timestamp.
    pub ts: String,
    /// Whether the message has been marked read.
    pub read: bool,
    /// When the record was created locally.
    pub created_at: DateTime<Utc>,
}

/// In-memory message store with age-based pruning.
pub struct MessageStore {
    messages: Mutex<HashMap<String, StoredMessage>>,
    retention: Duration,
}

impl MessageStore {
    /// Create a store that forgets records older than `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Apply a bus event: insert on message-received, flip read flags on
    /// read-marked (everything in the channel at or before the cursor).
    pub fn apply(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::MessageReceived {
                sender_id,
                sender_name,
                text,
                channel,
                ts: Some(ts),
                ..
            } => {
                let mut messages = self.messages.lock();
                Self::prune_locked(&mut messages, self.retention);
                let _ = messages.insert(
                    ts.clone(),
                    StoredMessage {
                        id: ts.clone(),
                        from_user: sender_id.clone(),
                        from_name: sender_name.clone(),
                        text: text.clone(),
                        channel: channel.clone(),
                        ts: ts.clone(),
                        read: false,
                        created_at: Utc::now(),
                    },
                );
            }
            BridgeEvent::ReadMarked {
                channel: Some(channel),
                ts,
                ..
            } => self.mark_channel_read(channel, ts.as_deref()),
            // No ts to key on, or no channel to match against.
            BridgeEvent::MessageReceived { .. } | BridgeEvent::ReadMarked { .. } => {}
        }
    }

    /// Mark one message read by id. Returns `false` for an unknown id.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut messages = self.messages.lock();
        match messages.get_mut(id) {
            Some(message) => {
                message.read = true;
                true
            }
            None => false,
        }
    }

    /// Mark everything in `channel` at or before the cursor `ts` read.
    ///
    /// A missing cursor marks the whole channel.
    pub fn mark_channel_read(&self, channel: &str, ts: Option<&str>) {
        let cursor = ts.and_then(|t| t.parse::<f64>().ok());
        let mut messages = self.messages.lock();
        for message in messages.values_mut() {
            if message.channel.as_deref() != Some(channel) {
                continue;
            }
            let before_cursor = match cursor {
                Some(cursor) => message.ts.parse::<f64>().is_ok_and(|t| t <= cursor),
                None => true,
            };
            if before_cursor {
                message.read = true;
            }
        }
    }

    /// Look up one message by id.
    pub fn get(&self, id: &str) -> Option<StoredMessage> {
        self.messages.lock().get(id).cloned()
    }

    /// List messages, unread first, newest first within each group.
    pub fn list(&self) -> Vec<StoredMessage> {
        let mut messages = self.messages.lock();
        Self::prune_locked(&mut messages, self.retention);
        let mut list: Vec<StoredMessage> = messages.values().cloned().collect();
        list.sort_by(|a, b| a.read.cmp(&b.read).then(b.ts.cmp(&a.ts)));
        list
    }

    /// Number of retained messages (without pruning).
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    fn prune_locked(messages: &mut HashMap<String, StoredMessage>, retention: Duration) {
        let now = Utc::now();
        messages.retain(|_, m| {
            (now - m.created_at).to_std().is_ok_and(|age| age < retention)
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
