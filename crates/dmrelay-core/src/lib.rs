//! # dmrelay-core
//!
//! Foundation types and pure logic for the dmrelay bridge.
//!
//! This crate provides the shared vocabulary that all other dmrelay crates
//! depend on:
//!
//! - **Events**: [`events::BridgeEvent`] canonical internal events,
//!   [`events::DevicePayload`] device wire payloads
//! - **Event bus**: [`bus::EventEmitter`] broadcast-based pub/sub
//! - **Envelope parsing**: [`envelope::parse_envelope`] untrusted wire input
//!   → canonical event
//! - **Deduplication**: [`dedupe::DedupeWindow`] TTL-bounded seen-set
//! - **Errors**: [`errors::SlackError`] hierarchy via `thiserror`
//! - **Metrics**: [`metrics`] shared metric name constants
//! - **Text**: UTF-8-safe truncation and credential redaction
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other dmrelay crates.

#![deny(unsafe_code)]

pub mod bus;
pub mod dedupe;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod text;
