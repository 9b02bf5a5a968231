//! Settings loading: defaults → file deep-merge → env overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::BridgeSettings;

/// Path of the user settings file: `~/.dmrelay/settings.json`.
#[must_use]
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".dmrelay").join("settings.json")
}

/// Load settings from the default path with env overrides applied.
///
/// A missing file is not an error — defaults are used and only the env
/// layer applies.
pub fn load_settings() -> Result<BridgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific file path with env overrides applied.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load with an injected environment lookup. Keeps the env layer testable
/// without touching process-global state.
fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())
        .expect("default settings serialize");

    let merged = if path.exists() {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: Value = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        deep_merge(defaults, file)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };

    let mut settings: BridgeSettings =
        serde_json::from_value(merged).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    apply_env_overrides(&mut settings, &env);
    Ok(settings)
}

/// Recursively merge `overlay` onto `base`.
///
/// Objects merge key-by-key; any other overlay value replaces the base
/// value wholesale.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `DMRELAY_*` environment variable overrides (highest priority).
fn apply_env_overrides(settings: &mut BridgeSettings, env: &impl Fn(&str) -> Option<String>) {
    let get = |name: &str| env(name).filter(|v| !v.is_empty());
    if let Some(v) = get("DMRELAY_APP_TOKEN") {
        settings.slack.app_token = v;
    }
    if let Some(v) = get("DMRELAY_BOT_TOKEN") {
        settings.slack.bot_token = v;
    }
    if let Some(v) = get("DMRELAY_API_BASE_URL") {
        settings.slack.api_base_url = v;
    }
    if let Some(v) = get("DMRELAY_DEFAULT_RECIPIENT") {
        settings.slack.default_recipient = Some(v);
    }
    if let Some(v) = parse_override::<u16>(get("DMRELAY_DEVICE_PORT"), "DMRELAY_DEVICE_PORT") {
        settings.server.device_port = v;
    }
    if let Some(v) = parse_override::<u16>(get("DMRELAY_ADMIN_PORT"), "DMRELAY_ADMIN_PORT") {
        settings.server.admin_port = v;
    }
    if let Some(v) = parse_override::<u64>(get("DMRELAY_DEDUPE_TTL_SECS"), "DMRELAY_DEDUPE_TTL_SECS")
    {
        settings.dedupe.ttl_secs = v;
    }
    if let Some(v) = get("DMRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn parse_override<T: std::str::FromStr>(raw: Option<String>, name: &str) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_disjoint_keys() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn deep_merge_overlay_wins() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": 2}));
        assert_eq!(merged["a"], 2);
    }

    #[test]
    fn deep_merge_nested_objects() {
        let base = json!({"server": {"devicePort": 8765, "adminPort": 8766}});
        let overlay = json!({"server": {"devicePort": 9000}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["server"]["devicePort"], 9000);
        assert_eq!(merged["server"]["adminPort"], 8766);
    }

    #[test]
    fn deep_merge_scalar_replaces_object() {
        let merged = deep_merge(json!({"a": {"b": 1}}), json!({"a": 5}));
        assert_eq!(merged["a"], 5);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_with_env(Path::new("/nonexistent/settings.json"), |_| None).unwrap();
        assert_eq!(settings.server.device_port, 8765);
    }

    #[test]
    fn file_layer_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"devicePort": 9100}, "dedupe": {"ttlSecs": 60}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, |_| None).unwrap();
        assert_eq!(settings.server.device_port, 9100);
        assert_eq!(settings.dedupe.ttl_secs, 60);
        // Untouched sections keep defaults.
        assert_eq!(settings.server.admin_port, 8766);
        assert_eq!(settings.store.retention_secs, 3600);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let err = load_with_env(&path, |_| None).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    fn env_map<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn env_layer_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"devicePort": 9100}, "slack": {"appToken": "xapp-file"}}"#,
        )
        .unwrap();

        let settings = load_with_env(
            &path,
            env_map(&[
                ("DMRELAY_DEVICE_PORT", "9500"),
                ("DMRELAY_APP_TOKEN", "xapp-env"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.server.device_port, 9500);
        assert_eq!(settings.slack.app_token, "xapp-env");
        // Values the env layer does not name keep the file/default layers.
        assert_eq!(settings.server.admin_port, 8766);
    }

    #[test]
    fn unparseable_numeric_env_override_ignored() {
        let settings = load_with_env(
            Path::new("/nonexistent/settings.json"),
            env_map(&[
                ("DMRELAY_DEVICE_PORT", "not-a-port"),
                ("DMRELAY_LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.server.device_port, 8765);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn empty_env_value_is_no_override() {
        let settings = load_with_env(
            Path::new("/nonexistent/settings.json"),
            env_map(&[("DMRELAY_BOT_TOKEN", "")]),
        )
        .unwrap();
        assert_eq!(settings.slack.bot_token, "");
        assert_eq!(settings.slack.api_base_url, "https://slack.com/api");
    }

    #[test]
    fn unknown_keys_in_file_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"futureSection": {"x": 1}}"#).unwrap();

        // serde ignores unknown fields by default; loading still succeeds.
        let settings = load_with_env(&path, |_| None).unwrap();
        assert_eq!(settings.server.device_port, 8765);
    }
}
