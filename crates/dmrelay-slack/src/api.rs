//! Slack Web API client.
//!
//! Thin typed wrapper over the handful of methods the bridge uses. Every
//! method goes through [`SlackApi::call`], which normalizes the three
//! failure modes into [`SlackError`]: transport failure, `ok: false`
//! rejection, and malformed 200 bodies. Transport error text is redacted
//! before it can reach logs.

use std::time::Duration;

use dmrelay_core::errors::SlackError;
use dmrelay_core::text::redact_tokens;
use dmrelay_settings::SlackSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Per-request deadline; a hung upstream must never pin a caller.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Confirmation returned by `chat.postMessage`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Conversation the message landed in.
    pub channel: String,
    /// Timestamp assigned by the platform.
    pub ts: String,
}

/// Slack Web API client.
pub struct SlackApi {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
    app_token: String,
}

impl SlackApi {
    /// Build a client from settings.
    #[must_use]
    pub fn new(settings: &SlackSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("http client construction");
        Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: settings.bot_token.clone(),
            app_token: settings.app_token.clone(),
        }
    }

    /// Open a Socket Mode connection; returns the realtime WebSocket URL.
    ///
    /// Authenticated with the app-level token, unlike every other method.
    pub async fn connections_open(&self) -> Result<String, SlackError> {
        const METHOD: &str = "apps.connections.open";
        let token = self.app_token.clone();
        let body = self.call_with_token(METHOD, &token, json!({})).await?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(SlackError::MalformedResponse { method: METHOD })
    }

    /// Resolve a user's display name. `Ok(None)` when the profile carries
    /// no usable name.
    pub async fn users_info(&self, user: &str) -> Result<Option<String>, SlackError> {
        let body = self.call("users.info", json!({ "user": user })).await?;
        let profile = &body["user"]["profile"];
        let name = [&profile["display_name"], &profile["real_name"], &body["user"]["name"]]
            .into_iter()
            .find_map(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        Ok(name)
    }

    /// Move the read cursor of a conversation to `ts`.
    pub async fn conversations_mark(&self, channel: &str, ts: &str) -> Result<(), SlackError> {
        let _ = self
            .call("conversations.mark", json!({ "channel": channel, "ts": ts }))
            .await?;
        Ok(())
    }

    /// Open (or reuse) a direct conversation with `user`; returns the
    /// channel id.
    pub async fn conversations_open(&self, user: &str) -> Result<String, SlackError> {
        const METHOD: &str = "conversations.open";
        let body = self.call(METHOD, json!({ "users": user })).await?;
        body["channel"]["id"]
            .as_str()
            .map(str::to_owned)
            .ok_or(SlackError::MalformedResponse { method: METHOD })
    }

    /// Post a message into a conversation.
    pub async fn chat_post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<SendReceipt, SlackError> {
        const METHOD: &str = "chat.postMessage";
        let body = self
            .call(METHOD, json!({ "channel": channel, "text": text }))
            .await?;
        let ts = body["ts"].as_str();
        let channel = body["channel"].as_str();
        match (channel, ts) {
            (Some(channel), Some(ts)) => Ok(SendReceipt {
                channel: channel.to_owned(),
                ts: ts.to_owned(),
            }),
            _ => Err(SlackError::MalformedResponse { method: METHOD }),
        }
    }

    /// POST a Web API method with the bot token.
    async fn call(&self, method: &'static str, body: Value) -> Result<Value, SlackError> {
        let token = self.bot_token.clone();
        self.call_with_token(method, &token, body).await
    }

    async fn call_with_token(
        &self,
        method: &'static str,
        token: &str,
        body: Value,
    ) -> Result<Value, SlackError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SlackError::Transport {
                method,
                detail: redact_tokens(&e.to_string()),
            })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|e| SlackError::Transport {
            method,
            detail: redact_tokens(&e.to_string()),
        })?;

        if payload.get("ok").and_then(Value::as_bool) == Some(true) {
            debug!(method, "web api call ok");
            Ok(payload)
        } else {
            let code = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or_else(|| if status.is_success() { "unknown_error" } else { status.as_str() })
                .to_owned();
            Err(SlackError::Api { method, code })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
