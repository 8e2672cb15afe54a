// File: architect-broker/src/lib.rs
// Purpose: Main entry point for the architect-broker library

//! # architect-broker
//!
//! Offline request broker for the Inner Architect web application. It sits
//! between the pages and the origin server and keeps the app usable when
//! the network is gone:
//!
//! - **Network-first reads**: successful reads are copied into a versioned
//!   cache generation and served from there while offline
//! - **Offline fallbacks**: an offline page for navigations, canned JSON for
//!   known API reads
//! - **Durable write queue**: mutating API requests that cannot reach the
//!   server are persisted and acknowledged, then replayed on sync
//! - **Notifications**: push messages, practice reminders and click routing
//!
//! ## Example
//!
//! ```rust,ignore
//! use architect_broker::{BrokerConfig, BrokerEvent, Host, Registration};
//!
//! let config = BrokerConfig::load_default()?;
//! let registration = Registration::new(host);
//! registration.dispatch(BrokerEvent::Install(Box::new(config))).await?;
//!
//! // Later, when connectivity returns
//! registration.dispatch(BrokerEvent::Sync("sync-all".into())).await?;
//! ```

pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fallback;
pub mod notify;
pub mod policy;
pub mod registration;
pub mod request;
pub mod store;
pub mod sync;
pub mod upstream;

// Re-export main types
pub use broker::{Broker, BrokerStatus, Host, LifecycleState, PeriodicReport};
pub use cache::{open_storage, CacheGeneration, CacheStats, CacheStorage, CachedResponse};
pub use config::{BrokerConfig, CacheBackend};
pub use error::{BrokerError, Result, UpstreamError};
pub use events::{BrokerEvent, ClientMessage, EventOutcome};
pub use notify::{ClickOutcome, ClientWindows, Notification, NotificationSink};
pub use registration::{Activation, Registration};
pub use request::{BrokerRequest, BrokerResponse, RequestKey};
pub use store::{ActionStore, PendingAction};
pub use sync::{PeriodicTag, SyncReport, SyncTag};
pub use upstream::{HttpUpstream, Upstream};
