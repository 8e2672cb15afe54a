// File: architect-server/src/host.rs
// Purpose: Build the shared platform capabilities from configuration

use anyhow::{Context, Result};
use architect_broker::notify::{ClientWindows, NotificationSink};
use architect_broker::{open_storage, ActionStore, BrokerConfig, Host, HttpUpstream};
use std::sync::Arc;

/// Open the configured cache backend and record store, and wire the real
/// network upstream with the given notification surfaces
pub async fn open_host(
    config: &BrokerConfig,
    notifications: Arc<dyn NotificationSink>,
    clients: Arc<dyn ClientWindows>,
) -> Result<Host> {
    let cache = open_storage(&config.cache.backend)
        .await
        .context("Failed to open cache storage")?;

    let store = ActionStore::open(&config.store.database_url)
        .await
        .with_context(|| format!("Failed to open record store {}", config.store.database_url))?;

    tracing::info!(
        "Cache backend: {}, record store: {}",
        cache.name(),
        config.store.database_url
    );

    let upstream = HttpUpstream::new().context("Failed to build HTTP client")?;

    Ok(Host {
        cache,
        store,
        upstream: Arc::new(upstream),
        notifications,
        clients,
    })
}
