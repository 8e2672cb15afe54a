// File: architect-server/src/lib.rs
// Purpose: HTTP surface of the offline broker

//! # architect-server
//!
//! Runs the broker as a reverse proxy in front of the Inner Architect app.
//! Every request outside `/__broker/` goes through the active broker
//! version; the control endpoints under `/__broker/` trigger sync, push and
//! lifecycle events, and `/__broker/events` streams notifications and
//! window commands to connected pages.

pub mod app;
pub mod host;
pub mod sse;

pub use app::{router, AppState};
pub use host::open_host;
pub use sse::{ClientEvent, SseClients, SseNotifications};
