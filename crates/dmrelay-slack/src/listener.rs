//! Upstream listener: envelope pipeline and outbound platform operations.
//!
//! The Socket Mode layer acks every envelope and hands the raw value here.
//! [`UpstreamListener::process_envelope`] then runs dedupe → parse →
//! name-resolution → publish. Every failure mode degrades to "skip and
//! log"; nothing in this pipeline can take the process down.

use std::sync::Arc;
use std::time::Duration;

use dmrelay_core::bus::EventEmitter;
use dmrelay_core::dedupe::DedupeWindow;
use dmrelay_core::envelope::{envelope_id, parse_envelope};
use dmrelay_core::errors::SlackError;
use dmrelay_core::events::BridgeEvent;
use dmrelay_core::metrics::{
    BRIDGE_EVENTS_PUBLISHED_TOTAL, ENVELOPES_DUPLICATE_TOTAL, ENVELOPES_IGNORED_TOTAL,
};
use dmrelay_core::text::preview;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{SendReceipt, SlackApi};

/// Upstream listener.
///
/// Owns the dedup window (the only shared mutable state in the pipeline)
/// and publishes canonical events on the bus. Connection lifecycle lives
/// in [`crate::socket`]; this type only sees envelopes.
pub struct UpstreamListener {
    api: Arc<SlackApi>,
    bus: Arc<EventEmitter>,
    dedupe: Mutex<DedupeWindow>,
    default_recipient: Option<String>,
}

impl UpstreamListener {
    /// Create a listener publishing to `bus`.
    #[must_use]
    pub fn new(
        api: Arc<SlackApi>,
        bus: Arc<EventEmitter>,
        dedupe_ttl: Duration,
        default_recipient: Option<String>,
    ) -> Self {
        Self {
            api,
            bus,
            dedupe: Mutex::new(DedupeWindow::with_ttl(dedupe_ttl)),
            default_recipient,
        }
    }

    /// Process one raw inbound envelope (already acked by the socket layer).
    ///
    /// Order: dedupe by envelope id, parse, resolve the sender's display
    /// name (silent fallback to the raw id), publish on the bus.
    pub async fn process_envelope(&self, raw: &Value) {
        if let Some(id) = envelope_id(raw) {
            if self.dedupe.lock().check_and_insert(&id) {
                counter!(ENVELOPES_DUPLICATE_TOTAL).increment(1);
                debug!(envelope_id = %id, "duplicate envelope dropped");
                return;
            }
        }

        let Some(event) = parse_envelope(raw) else {
            counter!(ENVELOPES_IGNORED_TOTAL).increment(1);
            debug!("envelope not actionable");
            return;
        };

        let sender = match &event {
            BridgeEvent::MessageReceived { sender_id: Some(id), .. } => Some(id.clone()),
            _ => None,
        };
        let event = match sender {
            Some(user) => event.with_sender_name(self.resolve_name(&user).await),
            None => event,
        };

        if let BridgeEvent::MessageReceived { text: Some(text), .. } = &event {
            debug!(text = %preview(text, 48), "dm received");
        }
        let delivered = self.bus.emit(event.clone());
        counter!(BRIDGE_EVENTS_PUBLISHED_TOTAL, "kind" => event.kind()).increment(1);
        debug!(kind = event.kind(), delivered, "event published");
    }

    /// Resolve a display name, falling back silently to the raw id.
    async fn resolve_name(&self, user: &str) -> Option<String> {
        match self.api.users_info(user).await {
            Ok(name) => name,
            Err(e) => {
                debug!(user, error = %e, "name resolution failed, keeping raw id");
                None
            }
        }
    }

    /// Mark a conversation read upstream.
    ///
    /// Returns `false` on missing parameters or any upstream failure;
    /// never panics, never propagates.
    pub async fn mark_read(&self, channel: &str, ts: &str) -> bool {
        if channel.is_empty() || ts.is_empty() {
            warn!(channel, ts, "mark_read missing parameters");
            return false;
        }
        match self.api.conversations_mark(channel, ts).await {
            Ok(()) => {
                debug!(channel, ts, "conversation marked read");
                true
            }
            Err(e) => {
                warn!(channel, ts, error = %e, "mark_read failed upstream");
                false
            }
        }
    }

    /// Send a message to a user's DM conversation.
    ///
    /// Target resolution: explicit `target_user` wins, then the configured
    /// default recipient; with neither, a descriptive error. Each upstream
    /// step (conversation open, post) surfaces its own failure.
    pub async fn send_message(
        &self,
        text: &str,
        target_user: Option<&str>,
    ) -> Result<SendReceipt, SlackError> {
        let user = target_user
            .or(self.default_recipient.as_deref())
            .ok_or(SlackError::NoTarget)?;
        let channel = self.api.conversations_open(user).await?;
        self.api.chat_post_message(&channel, text).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dmrelay_settings::SlackSettings;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn listener_for(server: &MockServer, default_recipient: Option<&str>) -> (UpstreamListener, Arc<EventEmitter>) {
        let api = Arc::new(SlackApi::new(&SlackSettings {
            app_token: "xapp-test".into(),
            bot_token: "xoxb-test".into(),
            api_base_url: server.uri(),
            default_recipient: None,
        }));
        let bus = Arc::new(EventEmitter::new());
        let listener = UpstreamListener::new(
            api,
            Arc::clone(&bus),
            Duration::from_secs(300),
            default_recipient.map(str::to_owned),
        );
        (listener, bus)
    }

    async fn mount_users_info(server: &MockServer, display_name: &str) {
        Mock::given(method("POST"))
            .and(path("/users.info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user": { "profile": { "display_name": display_name } },
            })))
            .mount(server)
            .await;
    }

    fn dm_envelope(envelope_id: &str) -> Value {
        json!({
            "envelope_id": envelope_id,
            "payload": { "event": {
                "type": "message",
                "user": "U123",
                "text": "hello",
                "channel": "C456",
                "ts": "1234.5678",
            }},
        })
    }

    #[tokio::test]
    async fn envelope_published_with_resolved_name() {
        let server = MockServer::start().await;
        mount_users_info(&server, "Moose").await;
        let (listener, bus) = listener_for(&server, None);
        let mut rx = bus.subscribe();

        listener.process_envelope(&dm_envelope("env-1")).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            BridgeEvent::MessageReceived {
                sender_id: Some("U123".into()),
                sender_name: Some("Moose".into()),
                text: Some("hello".into()),
                channel: Some("C456".into()),
                ts: Some("1234.5678".into()),
                envelope_id: Some("env-1".into()),
            }
        );
    }

    #[tokio::test]
    async fn duplicate_envelope_suppressed() {
        let server = MockServer::start().await;
        mount_users_info(&server, "Moose").await;
        let (listener, bus) = listener_for(&server, None);
        let mut rx = bus.subscribe();

        listener.process_envelope(&dm_envelope("env-1")).await;
        listener.process_envelope(&dm_envelope("env-1")).await;
        listener.process_envelope(&dm_envelope("env-2")).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.emit_count(), 2);
    }

    #[tokio::test]
    async fn envelope_without_id_never_deduplicated() {
        let server = MockServer::start().await;
        mount_users_info(&server, "Moose").await;
        let (listener, bus) = listener_for(&server, None);
        let mut rx = bus.subscribe();

        let raw = json!({ "event": { "type": "im_marked", "channel": "D1", "ts": "1.1" } });
        listener.process_envelope(&raw).await;
        listener.process_envelope(&raw).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn noise_envelope_publishes_nothing() {
        let server = MockServer::start().await;
        let (listener, bus) = listener_for(&server, None);
        let mut rx = bus.subscribe();

        let reaction = json!({ "event": { "type": "reaction_added", "user": "U123" } });
        let join = json!({ "event": { "type": "message", "subtype": "channel_join" } });
        listener.process_envelope(&reaction).await;
        listener.process_envelope(&join).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(bus.emit_count(), 0);
    }

    #[tokio::test]
    async fn name_resolution_failure_keeps_raw_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users.info"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (listener, bus) = listener_for(&server, None);
        let mut rx = bus.subscribe();

        listener.process_envelope(&dm_envelope("env-1")).await;

        let event = rx.recv().await.unwrap();
        assert_matches!(
            event,
            BridgeEvent::MessageReceived { sender_id: Some(id), sender_name: None, .. }
                if id == "U123"
        );
    }

    #[tokio::test]
    async fn read_marked_flows_through() {
        let server = MockServer::start().await;
        let (listener, bus) = listener_for(&server, None);
        let mut rx = bus.subscribe();

        let raw = json!({
            "envelope_id": "env-r",
            "payload": { "event": { "type": "im_marked", "channel": "D1", "ts": "9.9" } },
        });
        listener.process_envelope(&raw).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            BridgeEvent::ReadMarked {
                channel: Some("D1".into()),
                ts: Some("9.9".into()),
                envelope_id: Some("env-r".into()),
            }
        );
    }

    #[tokio::test]
    async fn mark_read_missing_params_is_false() {
        let server = MockServer::start().await;
        let (listener, _bus) = listener_for(&server, None);
        assert!(!listener.mark_read("", "1.2").await);
        assert!(!listener.mark_read("D1", "").await);
    }

    #[tokio::test]
    async fn mark_read_upstream_failure_is_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.mark"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false, "error": "not_in_channel",
            })))
            .mount(&server)
            .await;
        let (listener, _bus) = listener_for(&server, None);
        assert!(!listener.mark_read("D1", "1.2").await);
    }

    #[tokio::test]
    async fn mark_read_success_is_true() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.mark"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;
        let (listener, _bus) = listener_for(&server, None);
        assert!(listener.mark_read("D1", "1.2").await);
    }

    #[tokio::test]
    async fn send_message_without_target_errors() {
        let server = MockServer::start().await;
        let (listener, _bus) = listener_for(&server, None);
        let err = listener.send_message("hi", None).await.unwrap_err();
        assert_matches!(err, SlackError::NoTarget);
    }

    #[tokio::test]
    async fn send_message_uses_default_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "channel": { "id": "D42" },
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "channel": "D42", "ts": "5.5",
            })))
            .mount(&server)
            .await;

        let (listener, _bus) = listener_for(&server, Some("U999"));
        let receipt = listener.send_message("hi", None).await.unwrap();
        assert_eq!(receipt.channel, "D42");
    }

    #[tokio::test]
    async fn send_message_surfaces_open_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false, "error": "user_not_found",
            })))
            .mount(&server)
            .await;

        let (listener, _bus) = listener_for(&server, None);
        let err = listener.send_message("hi", Some("UNOPE")).await.unwrap_err();
        assert_matches!(
            err,
            SlackError::Api { method: "conversations.open", code } if code == "user_not_found"
        );
    }
}
