//! Per-device WebSocket connection handling.
//!
//! Each upgraded socket gets a UUID v7 id, a bounded outbound channel
//! feeding its write loop, and a read loop that accepts a small set of
//! device-originated frames (currently `mark_read`).

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::GatewayState;
use crate::broadcast::DeviceConnection;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Outbound channel depth per connection.
const OUTBOUND_BUFFER: usize = 64;

/// `GET /ws` — upgrade a device connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let id = Uuid::now_v7().to_string();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    let connection = Arc::new(DeviceConnection::new(id.clone(), tx));
    state.broadcaster.add(Arc::clone(&connection)).await;
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(conn_id = %id, "device connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            () = connection.closed() => {
                debug!(conn_id = %id, "connection force-closed by broadcaster");
                break;
            }
            outbound = rx.recv() => {
                let Some(payload) = outbound else { break };
                if sink.send(Message::Text(payload.as_str().into())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                    Some(Ok(Message::Text(text))) => handle_device_frame(&state, &text).await,
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    connection.mark_closed();
    state.broadcaster.remove(&id).await;
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(conn_id = %id, "device disconnected");
}

/// Handle a device-originated frame.
///
/// `{type: "mark_read", channel, ts}` pushes the read cursor upstream and
/// mirrors it in the local store. Unknown frames are logged and dropped.
async fn handle_device_frame(state: &GatewayState, text: &str) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        debug!("unparseable device frame ignored");
        return;
    };
    match frame.get("type").and_then(Value::as_str) {
        Some("mark_read") => {
            let channel = frame.get("channel").and_then(Value::as_str).unwrap_or("");
            let ts = frame.get("ts").and_then(Value::as_str).unwrap_or("");
            if state.listener.mark_read(channel, ts).await {
                state.store.mark_channel_read(channel, Some(ts));
                debug!(channel, ts, "device mark_read applied");
            } else {
                warn!(channel, ts, "device mark_read rejected");
            }
        }
        other => debug!(frame_type = ?other, "unknown device frame ignored"),
    }
}
