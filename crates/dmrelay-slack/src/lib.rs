//! # dmrelay-slack
//!
//! Upstream side of the bridge: the Socket Mode connection to the chat
//! platform and the Web API calls the service makes back into it.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `api` | Typed Web API client (`users.info`, `conversations.mark`, …) |
//! | `socket` | Socket Mode supervisor: connect, ack, reconnect/backoff |
//! | `listener` | Envelope pipeline: dedupe → parse → resolve → publish |
//!
//! ## Data Flow
//!
//! `socket` reads a frame → acks it → `listener.process_envelope` →
//! canonical event on the bus. The reverse path (`mark_read`,
//! `send_message`) goes `listener` → `api`.

#![deny(unsafe_code)]

pub mod api;
pub mod listener;
pub mod socket;

pub use api::{SendReceipt, SlackApi};
pub use listener::UpstreamListener;
pub use socket::run_socket_mode;
