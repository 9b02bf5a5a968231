//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON
//! wire format and implement [`Default`] with production default values.
//! `#[serde(default)]` allows partial files — missing fields get their
//! default during deserialization.

use serde::{Deserialize, Serialize};

/// Root settings for the dmrelay service.
///
/// Loaded from `~/.dmrelay/settings.json` with defaults applied for
/// missing fields; `DMRELAY_*` environment variables override specific
/// values last.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Settings schema version.
    pub version: String,
    /// Server network settings.
    pub server: ServerSettings,
    /// Upstream chat-platform credentials and endpoints.
    pub slack: SlackSettings,
    /// Envelope deduplication settings.
    pub dedupe: DedupeSettings,
    /// Message store retention settings.
    pub store: StoreSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            slack: SlackSettings::default(),
            dedupe: DedupeSettings::default(),
            store: StoreSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Network settings for the device gateway and admin surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address for both listeners.
    pub bind_addr: String,
    /// Port for device WebSocket connections.
    pub device_port: u16,
    /// Port for admin HTTP endpoints (health, messages, metrics).
    pub admin_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            device_port: 8765,
            admin_port: 8766,
        }
    }
}

/// Upstream platform settings.
///
/// Tokens default to empty — the service refuses to start the upstream
/// listener without them, but everything else still works, which keeps
/// local development of the device side possible.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlackSettings {
    /// App-level token (`xapp-…`) for opening the realtime connection.
    pub app_token: String,
    /// Bot token (`xoxb-…`) for Web API calls.
    pub bot_token: String,
    /// Web API base URL. Overridable for tests.
    pub api_base_url: String,
    /// Default recipient user id for `send_message` without an explicit
    /// target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_recipient: Option<String>,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            app_token: String::new(),
            bot_token: String::new(),
            api_base_url: "https://slack.com/api".to_string(),
            default_recipient: None,
        }
    }
}

/// Envelope deduplication settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupeSettings {
    /// Seconds an envelope id is remembered.
    pub ttl_secs: u64,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

/// Message store retention settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Seconds a stored message survives before age-based pruning.
    pub retention_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter directive (overridden by `RUST_LOG`).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let s = BridgeSettings::default();
        assert_eq!(s.version, "0.1.0");
        assert_eq!(s.server.device_port, 8765);
        assert_eq!(s.server.admin_port, 8766);
        assert_eq!(s.slack.api_base_url, "https://slack.com/api");
        assert!(s.slack.default_recipient.is_none());
        assert_eq!(s.dedupe.ttl_secs, 300);
        assert_eq!(s.store.retention_secs, 3600);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: BridgeSettings =
            serde_json::from_str(r#"{"server": {"devicePort": 9000}}"#).unwrap();
        assert_eq!(s.server.device_port, 9000);
        assert_eq!(s.server.admin_port, 8766);
        assert_eq!(s.dedupe.ttl_secs, 300);
    }

    #[test]
    fn camel_case_wire_names() {
        let s = BridgeSettings::default();
        let json = serde_json::to_value(&s).unwrap();
        assert!(json["server"].get("devicePort").is_some());
        assert!(json["slack"].get("apiBaseUrl").is_some());
        assert!(json["store"].get("retentionSecs").is_some());
    }

    #[test]
    fn absent_recipient_omitted() {
        let json = serde_json::to_value(SlackSettings::default()).unwrap();
        assert!(json.get("defaultRecipient").is_none());
    }
}
