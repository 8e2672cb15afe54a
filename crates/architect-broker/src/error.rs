// File: architect-broker/src/error.rs
// Purpose: Error types surfaced at the broker boundary

use thiserror::Error;

/// Errors that escape the broker.
///
/// Network failures during normal request handling never show up here; they
/// are converted into cached or synthesized responses. Only install-fatal
/// failures and durable store failures propagate to callers.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A mandatory manifest entry could not be cached
    #[error("install of generation {generation} failed: {url}: {reason}")]
    Install {
        generation: String,
        url: String,
        reason: String,
    },

    /// The requested lifecycle transition is not valid from the current state
    #[error("invalid lifecycle transition: {0}")]
    Lifecycle(String),

    /// The durable record store failed to open, read or commit
    #[error("record store error: {0}")]
    Store(#[from] sqlx::Error),

    /// The response cache backend failed
    #[error("cache error: {0}")]
    Cache(#[source] anyhow::Error),

    /// Notification surface or client windows failed
    #[error("platform error: {0}")]
    Platform(#[source] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL could not be resolved against the configured origin
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Failure of a single upstream exchange.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No response was received (connection refused, DNS, reset, ...)
    #[error("network unavailable: {0}")]
    Network(String),

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
