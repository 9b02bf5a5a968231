//! # dmrelay-settings
//!
//! Configuration management with layered sources for dmrelay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`BridgeSettings::default()`]
//! 2. **User file** — `~/.dmrelay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `DMRELAY_*` overrides (highest priority)
//!
//! The loaded value is plain data: the binary loads it once at startup and
//! passes it (or slices of it) to each component. There is no global
//! singleton, so tests construct whatever settings they need.
//!
//! # Usage
//!
//! ```no_run
//! use dmrelay_settings::load_settings;
//!
//! let settings = load_settings().expect("settings");
//! println!("device port: {}", settings.server.device_port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
