//! Socket Mode connection supervisor.
//!
//! Owns the long-lived realtime connection: opens the WebSocket URL via
//! `apps.connections.open`, acks every envelope the moment it arrives,
//! and hands the raw value to the [`UpstreamListener`]. Reconnects with
//! capped exponential backoff plus jitter; the listener never sees any of
//! this — it only observes lifecycle transitions through the log.

use std::sync::Arc;
use std::time::Duration;

use dmrelay_core::envelope::envelope_id;
use dmrelay_core::errors::SlackError;
use dmrelay_core::metrics::{ENVELOPES_RECEIVED_TOTAL, SOCKET_CONNECT_FAILURES_TOTAL};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use rand::Rng;
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::SlackApi;
use crate::listener::UpstreamListener;

/// First reconnect delay.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Reconnect delay ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(60);
/// Maximum jitter added to each delay.
const BACKOFF_JITTER_MS: u64 = 250;

/// Why a connected session ended.
enum SessionEnd {
    /// Shutdown was requested; the supervisor must stop.
    Shutdown,
    /// The server closed or asked us to reconnect; reconnect immediately.
    Reconnect,
}

/// What a text frame from the realtime channel means.
#[derive(Debug, PartialEq, Eq)]
enum FrameKind {
    /// Server greeting after connect.
    Hello,
    /// Server-initiated reconnect request.
    Disconnect,
    /// An event envelope, with the id to ack (when present).
    Envelope { ack_id: Option<String> },
    /// Anything else; ignored.
    Other,
}

fn classify(frame: &Value) -> FrameKind {
    match frame.get("type").and_then(Value::as_str) {
        Some("hello") => FrameKind::Hello,
        Some("disconnect") => FrameKind::Disconnect,
        Some("events_api") => FrameKind::Envelope {
            ack_id: envelope_id(frame),
        },
        _ => match envelope_id(frame) {
            // Unknown-typed frames that still carry an envelope id get
            // acked so the server stops retrying them; the parser decides
            // whether they are actionable.
            Some(id) => FrameKind::Envelope { ack_id: Some(id) },
            None => FrameKind::Other,
        },
    }
}

/// Delay before reconnect attempt `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1_u32 << attempt.saturating_sub(1).min(6));
    let capped = exp.min(BACKOFF_CAP);
    let jitter = rand::rng().random_range(0..BACKOFF_JITTER_MS);
    capped + Duration::from_millis(jitter)
}

/// Run the Socket Mode supervisor until `shutdown` is cancelled.
///
/// Never returns an error: every failure is logged and absorbed into the
/// reconnect loop.
pub async fn run_socket_mode(
    api: Arc<SlackApi>,
    listener: Arc<UpstreamListener>,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;
    while !shutdown.is_cancelled() {
        debug!("socket mode connecting");
        match session(&api, &listener, &shutdown).await {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Reconnect) => {
                attempt = 0;
                info!("socket mode disconnected, reconnecting");
            }
            Err(e) => {
                attempt += 1;
                let delay = backoff_delay(attempt);
                counter!(SOCKET_CONNECT_FAILURES_TOTAL).increment(1);
                warn!(error = %e, attempt, ?delay, "socket mode connection failed");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    info!("socket mode supervisor stopped");
}

/// One connected session: read frames until shutdown, disconnect, or error.
async fn session(
    api: &SlackApi,
    listener: &Arc<UpstreamListener>,
    shutdown: &CancellationToken,
) -> Result<SessionEnd, SlackError> {
    let url = api.connections_open().await?;
    let (ws, _) = connect_async(&url).await.map_err(|e| SlackError::Transport {
        method: "socket.connect",
        detail: e.to_string(),
    })?;
    info!("connected to realtime channel");
    let (mut sink, mut stream) = ws.split();

    loop {
        let message = tokio::select! {
            () = shutdown.cancelled() => {
                info!("disconnecting from realtime channel");
                let _ = sink.send(Message::Close(None)).await;
                return Ok(SessionEnd::Shutdown);
            }
            message = stream.next() => message,
        };

        match message {
            None => return Ok(SessionEnd::Reconnect),
            Some(Err(e)) => {
                warn!(error = %e, "realtime channel read error");
                return Ok(SessionEnd::Reconnect);
            }
            Some(Ok(Message::Text(text))) => {
                let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                    debug!("unparseable frame ignored");
                    continue;
                };
                match classify(&frame) {
                    FrameKind::Hello => info!("realtime channel ready"),
                    FrameKind::Disconnect => {
                        let reason = frame
                            .get("reason")
                            .and_then(Value::as_str)
                            .unwrap_or("unspecified");
                        info!(reason, "server requested reconnect");
                        return Ok(SessionEnd::Reconnect);
                    }
                    FrameKind::Envelope { ack_id } => {
                        // Ack first; processing must never delay it. A
                        // failed ack just means the server may retry,
                        // which the dedup window absorbs.
                        if let Some(id) = ack_id {
                            let ack = json!({ "envelope_id": id }).to_string();
                            if let Err(e) = sink.send(Message::Text(ack.into())).await {
                                warn!(envelope_id = %id, error = %e, "envelope ack failed");
                            }
                        }
                        counter!(ENVELOPES_RECEIVED_TOTAL).increment(1);
                        // Process off the read loop: a stalled name lookup
                        // must not hold up acks, pings, or cancellation.
                        let listener = Arc::clone(listener);
                        let _ = tokio::spawn(async move {
                            listener.process_envelope(&frame).await;
                        });
                    }
                    FrameKind::Other => debug!("frame ignored"),
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                if let Err(e) = sink.send(Message::Pong(payload)).await {
                    warn!(error = %e, "pong failed");
                }
            }
            Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Reconnect),
            Some(Ok(_)) => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use dmrelay_core::bus::EventEmitter;
    use dmrelay_settings::SlackSettings;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn classify_hello() {
        assert_eq!(classify(&json!({"type": "hello"})), FrameKind::Hello);
    }

    #[test]
    fn classify_disconnect() {
        assert_eq!(
            classify(&json!({"type": "disconnect", "reason": "refresh_requested"})),
            FrameKind::Disconnect
        );
    }

    #[test]
    fn classify_events_api_with_id() {
        let frame = json!({"type": "events_api", "envelope_id": "env-1", "payload": {}});
        assert_eq!(
            classify(&frame),
            FrameKind::Envelope { ack_id: Some("env-1".into()) }
        );
    }

    #[test]
    fn classify_events_api_without_id() {
        let frame = json!({"type": "events_api", "payload": {}});
        assert_eq!(classify(&frame), FrameKind::Envelope { ack_id: None });
    }

    #[test]
    fn classify_unknown_type_with_envelope_id_still_acked() {
        let frame = json!({"type": "interactive", "envelope_id": "env-2"});
        assert_eq!(
            classify(&frame),
            FrameKind::Envelope { ack_id: Some("env-2".into()) }
        );
    }

    #[test]
    fn classify_untyped_frame_is_other() {
        assert_eq!(classify(&json!({"foo": 1})), FrameKind::Other);
        assert_eq!(classify(&json!(null)), FrameKind::Other);
    }

    #[tokio::test]
    async fn acks_flow_while_name_resolution_is_stalled() {
        let web = MockServer::start().await;
        // A name lookup that answers long after the test deadline.
        Mock::given(method("POST"))
            .and(path("/users.info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_json(json!({
                        "ok": true,
                        "user": { "profile": { "display_name": "Moose" } },
                    })),
            )
            .mount(&web)
            .await;

        let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "url": format!("ws://{addr}"),
            })))
            .mount(&web)
            .await;

        let api = Arc::new(SlackApi::new(&SlackSettings {
            app_token: "xapp-test".into(),
            bot_token: "xoxb-test".into(),
            api_base_url: web.uri(),
            default_recipient: None,
        }));
        let bus = Arc::new(EventEmitter::new());
        let listener = Arc::new(UpstreamListener::new(
            Arc::clone(&api),
            bus,
            Duration::from_secs(300),
            None,
        ));
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(run_socket_mode(api, listener, shutdown.clone()));

        let (stream, _) = tcp.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(json!({"type": "hello"}).to_string().into()))
            .await
            .unwrap();
        for i in 0..2 {
            let envelope = json!({
                "type": "events_api",
                "envelope_id": format!("env-{i}"),
                "payload": { "event": {
                    "type": "message",
                    "user": "U123",
                    "text": "hello",
                    "channel": "D1",
                    "ts": format!("{i}.0"),
                }},
            });
            ws.send(Message::Text(envelope.to_string().into()))
                .await
                .unwrap();
        }

        // Both acks must arrive while the lookups are still pending.
        let mut acked = Vec::new();
        while acked.len() < 2 {
            let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("ack within deadline")
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).unwrap();
                if let Some(id) = value.get("envelope_id").and_then(Value::as_str) {
                    acked.push(id.to_owned());
                }
            }
        }
        assert_eq!(acked, vec!["env-0", "env-1"]);

        // Cancellation must not wait on the stalled lookups either.
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), supervisor)
            .await
            .expect("supervisor stops promptly")
            .unwrap();
    }

    #[test]
    fn backoff_grows_and_caps() {
        let jitter = Duration::from_millis(BACKOFF_JITTER_MS);
        assert!(backoff_delay(1) >= BACKOFF_BASE);
        assert!(backoff_delay(1) < BACKOFF_BASE * 2 + jitter);
        assert!(backoff_delay(3) >= Duration::from_secs(4));
        // Far past the cap, delay stays bounded.
        assert!(backoff_delay(30) <= BACKOFF_CAP + jitter);
        assert!(backoff_delay(u32::MAX) <= BACKOFF_CAP + jitter);
    }
}
