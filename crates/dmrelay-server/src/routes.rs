//! HTTP surfaces: the device WebSocket endpoint and the admin API.
//!
//! Two routers on two ports. The device router only upgrades `/ws`; the
//! admin router exposes health, the message store, read marking, outbound
//! sends, and the Prometheus scrape endpoint.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::GatewayState;
use crate::connection::ws_handler;

/// Router for the device-facing WebSocket port.
pub fn device_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the local admin port.
pub fn admin_router(state: GatewayState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/messages", get(list_messages))
        .route("/messages/{id}/read", post(mark_message_read))
        .route("/send", post(send_message))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /healthz`
async fn healthz(State(state): State<GatewayState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "deviceConnections": state.broadcaster.connection_count(),
        "broadcasting": state.broadcaster.is_started(),
        "busSubscribers": state.bus.subscriber_count(),
        "storedMessages": state.store.len(),
    }))
}

/// `GET /messages` — stored DMs, unread first.
async fn list_messages(State(state): State<GatewayState>) -> impl IntoResponse {
    axum::Json(state.store.list())
}

/// `POST /messages/{id}/read` — push the read cursor upstream, then mirror
/// it locally. Unknown ids are 404; upstream rejection is 502.
async fn mark_message_read(
    Path(id): Path<String>,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    let Some(message) = state.store.get(&id) else {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "ok": false, "error": "unknown_message" })),
        );
    };
    let channel = message.channel.unwrap_or_default();
    if state.listener.mark_read(&channel, &message.ts).await {
        let _ = state.store.mark_read(&id);
        info!(message_id = %id, channel = %channel, "message marked read");
        (StatusCode::OK, axum::Json(json!({ "ok": true })))
    } else {
        warn!(message_id = %id, "upstream rejected mark_read");
        (
            StatusCode::BAD_GATEWAY,
            axum::Json(json!({ "ok": false, "error": "upstream_mark_failed" })),
        )
    }
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
    /// Explicit recipient; falls back to the configured default.
    user: Option<String>,
}

/// `POST /send` — send a DM as the bot.
async fn send_message(
    State(state): State<GatewayState>,
    axum::Json(req): axum::Json<SendRequest>,
) -> impl IntoResponse {
    match state
        .listener
        .send_message(&req.text, req.user.as_deref())
        .await
    {
        Ok(receipt) => (
            StatusCode::OK,
            axum::Json(json!({ "ok": true, "channel": receipt.channel, "ts": receipt.ts })),
        ),
        Err(e) => {
            warn!(error = %e, "outbound send failed");
            (
                StatusCode::BAD_GATEWAY,
                axum::Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

/// `GET /metrics` — Prometheus exposition text.
async fn render_metrics(State(state): State<GatewayState>) -> String {
    state
        .metrics
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
