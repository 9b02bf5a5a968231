//! Error taxonomy for upstream platform calls.
//!
//! Nothing here is process-fatal: callers either surface these as a
//! boolean failure (`mark_read`), a descriptive error (`send_message`),
//! or log-and-continue. Transport details are stringly-typed so the
//! foundation crate stays free of HTTP client dependencies.

use thiserror::Error;

/// Failure of an upstream chat-platform call.
#[derive(Debug, Error)]
pub enum SlackError {
    /// `send_message` had no explicit target and no configured default
    /// recipient.
    #[error("no target user: none supplied and no default recipient configured")]
    NoTarget,

    /// The HTTP request itself failed (connect, timeout, TLS).
    #[error("{method} transport failure: {detail}")]
    Transport {
        /// API method, e.g. `chat.postMessage`.
        method: &'static str,
        /// Underlying transport error, already redacted.
        detail: String,
    },

    /// The platform answered with `ok: false`.
    #[error("{method} rejected by upstream: {code}")]
    Api {
        /// API method, e.g. `conversations.open`.
        method: &'static str,
        /// Platform error code, e.g. `channel_not_found`.
        code: String,
    },

    /// The platform answered 200 but the body was not the expected shape.
    #[error("{method} returned a malformed response")]
    MalformedResponse {
        /// API method.
        method: &'static str,
    },
}
