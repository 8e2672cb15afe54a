// File: architect-broker/src/broker.rs
// Purpose: One broker version: install, activation, request handling

use futures::future::{join_all, try_join_all};
use http::{header, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use crate::cache::{CacheGeneration, CacheStats, CacheStorage, CachedResponse};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::fallback::{self, ApiFallback};
use crate::notify::{
    self, ClickOutcome, ClientWindows, Notification, NotificationAction, NotificationData,
    NotificationSink, PushPayload,
};
use crate::policy::{InterceptPolicy, RequestClass};
use crate::request::{BrokerRequest, BrokerResponse};
use crate::store::{ActionStore, NewPendingAction};
use crate::sync::{self, PeriodicTag, Reminder, SyncReport, SyncTag};
use crate::upstream::Upstream;

/// Title used for reminder notifications without their own title
pub const REMINDER_TITLE: &str = "Practice Reminder";

/// Platform capabilities shared by every broker version
#[derive(Clone)]
pub struct Host {
    pub cache: Arc<dyn CacheStorage>,
    pub store: ActionStore,
    pub upstream: Arc<dyn Upstream>,
    pub notifications: Arc<dyn NotificationSink>,
    pub clients: Arc<dyn ClientWindows>,
}

/// Lifecycle of one broker version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Active,
    Superseded,
    /// Install failed; never served a request
    Redundant,
}

/// Outcome of a periodic sync
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodicReport {
    Reminders { notified: Option<Notification> },
    ContentUpdated { refreshed: usize, failed: usize },
}

/// Snapshot for status output
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatus {
    pub generation: CacheGeneration,
    pub state: LifecycleState,
    pub cache_backend: &'static str,
    pub cached_entries: usize,
    pub stats: CacheStats,
}

/// A single broker version bound to one cache generation
pub struct Broker {
    config: BrokerConfig,
    origin: Url,
    policy: InterceptPolicy,
    generation: CacheGeneration,
    host: Host,
    state: RwLock<LifecycleState>,
    stats: RwLock<CacheStats>,
}

impl Broker {
    /// Create a broker version in the `Installing` state
    pub fn new(config: BrokerConfig, host: Host) -> Result<Self> {
        let origin = config.origin()?;
        let policy = InterceptPolicy::new(&origin, config.api.prefix.clone());
        let generation = CacheGeneration::new(config.cache.generation.clone());

        Ok(Self {
            config,
            origin,
            policy,
            generation,
            host,
            state: RwLock::new(LifecycleState::Installing),
            stats: RwLock::new(CacheStats::default()),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn generation(&self) -> &CacheGeneration {
        &self.generation
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// Resolve an application path against the upstream origin
    pub fn url_for(&self, path: &str) -> Result<Url> {
        Ok(self.origin.join(path)?)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Populate the generation and prepare the record store.
    ///
    /// The mandatory manifest is all-or-nothing: on failure the partial
    /// generation is deleted and the broker becomes `Redundant`. The optional
    /// manifest is best-effort.
    pub async fn install(&self) -> Result<()> {
        self.expect_state(LifecycleState::Installing).await?;
        let label = &self.generation.label;
        tracing::info!("Installing generation {}", label);

        let mandatory = self.config.manifest.mandatory();
        let result = match self.host.store.ensure_schema().await {
            Ok(()) => try_join_all(mandatory.iter().map(|path| self.precache(path)))
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::error!("Install of {} failed: {}", label, e);
            if let Err(cleanup) = self.host.cache.delete_generation(label).await {
                tracing::warn!("Failed to discard partial generation {}: {}", label, cleanup);
            }
            *self.state.write().await = LifecycleState::Redundant;
            return Err(e);
        }

        let optional = &self.config.manifest.offline_views;
        let results = join_all(optional.iter().map(|path| self.precache(path))).await;
        for (path, result) in optional.iter().zip(&results) {
            if let Err(e) = result {
                tracing::warn!("Optional asset {} not cached: {}", path, e);
            }
        }

        tracing::info!(
            "Generation {} installed ({} mandatory, {}/{} optional)",
            label,
            mandatory.len(),
            results.iter().filter(|r| r.is_ok()).count(),
            optional.len()
        );

        *self.state.write().await = LifecycleState::Waiting;
        Ok(())
    }

    /// Become the current generation, deleting every other one.
    /// Returns the labels that were purged.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.expect_state(LifecycleState::Waiting).await?;

        let label = &self.generation.label;
        let mut purged = Vec::new();
        let generations = self.host.cache.generations().await.map_err(BrokerError::Cache)?;

        for stale in generations.into_iter().filter(|g| g != label) {
            self.host
                .cache
                .delete_generation(&stale)
                .await
                .map_err(BrokerError::Cache)?;
            tracing::info!("Deleted stale cache generation {}", stale);
            purged.push(stale);
        }

        *self.state.write().await = LifecycleState::Active;
        tracing::info!("Generation {} active", label);
        Ok(purged)
    }

    /// A newer version took over
    pub async fn supersede(&self) {
        let mut state = self.state.write().await;
        if *state == LifecycleState::Active {
            *state = LifecycleState::Superseded;
            tracing::info!("Generation {} superseded", self.generation.label);
        }
    }

    /// Mark a version that will never activate
    pub async fn discard(&self) {
        *self.state.write().await = LifecycleState::Redundant;
    }

    async fn expect_state(&self, expected: LifecycleState) -> Result<()> {
        let state = self.state().await;
        if state != expected {
            return Err(BrokerError::Lifecycle(format!(
                "generation {} is {:?}, expected {:?}",
                self.generation.label, state, expected
            )));
        }
        Ok(())
    }

    /// Fetch one path and store it in this generation
    async fn precache(&self, path: &str) -> Result<()> {
        let install_error = |reason: String| BrokerError::Install {
            generation: self.generation.label.clone(),
            url: path.to_string(),
            reason,
        };

        let request = BrokerRequest::get(self.url_for(path)?);
        let response = self
            .host
            .upstream
            .fetch(&request)
            .await
            .map_err(|e| install_error(e.to_string()))?;

        if !response.is_ok() {
            return Err(install_error(format!("status {}", response.status)));
        }

        self.host
            .cache
            .put(&self.generation.label, CachedResponse::capture(request.key(), &response))
            .await
            .map_err(|e| install_error(format!("cache write failed: {}", e)))
    }

    // ---------------------------------------------------------------------
    // Fetch
    // ---------------------------------------------------------------------

    /// Handle one intercepted request.
    ///
    /// Only durable store failures while queuing a write come back as `Err`.
    pub async fn handle_fetch(&self, request: BrokerRequest) -> Result<BrokerResponse> {
        let class = if self.state().await == LifecycleState::Active {
            self.policy.classify(&request)
        } else {
            RequestClass::PassThrough
        };

        tracing::debug!(method = %request.method, url = %request.url, ?class, "fetch");

        match class {
            RequestClass::PassThrough => Ok(pass_through(self.host.upstream.as_ref(), &request).await),
            RequestClass::PageRead => Ok(self.page_read(&request).await),
            RequestClass::ApiRead => Ok(self.api_read(&request).await),
            RequestClass::ApiWrite => self.api_write(request).await,
        }
    }

    async fn page_read(&self, request: &BrokerRequest) -> BrokerResponse {
        if let Some(response) = self.network_first(request).await {
            return response;
        }
        if let Some(response) = self.cached(request).await {
            return response;
        }

        self.record_fallback().await;
        if request.accepts_html() {
            self.offline_page().await
        } else {
            fallback::service_unavailable()
        }
    }

    async fn api_read(&self, request: &BrokerRequest) -> BrokerResponse {
        if let Some(response) = self.network_first(request).await {
            return response;
        }
        if let Some(response) = self.cached(request).await {
            return response;
        }

        self.record_fallback().await;
        ApiFallback::for_path(self.policy.api_prefix(), request.path()).response()
    }

    async fn api_write(&self, request: BrokerRequest) -> Result<BrokerResponse> {
        match self.host.upstream.fetch(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::debug!("Write to {} failed ({}), queuing", request.url, e);
                let queued = self
                    .host
                    .store
                    .enqueue(NewPendingAction::from_request(&request))
                    .await?;
                self.record_fallback().await;
                Ok(fallback::queued_acknowledgement(queued.id))
            }
        }
    }

    /// Live response if the network answered; a 200 is copied into the cache
    async fn network_first(&self, request: &BrokerRequest) -> Option<BrokerResponse> {
        match self.host.upstream.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.store_copy(request, &response).await;
                }
                Some(response)
            }
            Err(e) => {
                tracing::debug!("Network read of {} failed: {}", request.url, e);
                None
            }
        }
    }

    async fn store_copy(&self, request: &BrokerRequest, response: &BrokerResponse) {
        let cached = CachedResponse::capture(request.key(), response);
        match self.host.cache.put(&self.generation.label, cached).await {
            Ok(()) => self.stats.write().await.stored += 1,
            Err(e) => tracing::warn!("Failed to cache {}: {}", request.url, e),
        }
    }

    async fn cached(&self, request: &BrokerRequest) -> Option<BrokerResponse> {
        let found = match self.host.cache.get(&self.generation.label, &request.key()).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Cache lookup for {} failed: {}", request.url, e);
                None
            }
        };

        let mut stats = self.stats.write().await;
        match found {
            Some(cached) => {
                stats.hits += 1;
                Some(cached.to_response())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    async fn offline_page(&self) -> BrokerResponse {
        let Ok(url) = self.url_for(&self.config.manifest.offline_page) else {
            return fallback::bare_offline_page();
        };
        let request = BrokerRequest::get(url);

        match self.host.cache.get(&self.generation.label, &request.key()).await {
            Ok(Some(cached)) => cached.to_response().offline_fallback(),
            Ok(None) => fallback::bare_offline_page(),
            Err(e) => {
                tracing::warn!("Offline page lookup failed: {}", e);
                fallback::bare_offline_page()
            }
        }
    }

    async fn record_fallback(&self) {
        self.stats.write().await.fallbacks += 1;
    }

    // ---------------------------------------------------------------------
    // Sync
    // ---------------------------------------------------------------------

    pub async fn sync(&self, tag: SyncTag) -> SyncReport {
        sync::replay_pending(
            &self.host.store,
            self.host.upstream.as_ref(),
            tag,
            &self.config.api.prefix,
        )
        .await
    }

    pub async fn periodic_sync(&self, tag: PeriodicTag) -> PeriodicReport {
        match tag {
            PeriodicTag::CheckReminders => PeriodicReport::Reminders {
                notified: self.check_reminders().await,
            },
            PeriodicTag::UpdateContent => self.update_content().await,
        }
    }

    async fn check_reminders(&self) -> Option<Notification> {
        let url = match self.url_for(&self.config.api.reminders_path) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Invalid reminders path: {}", e);
                return None;
            }
        };
        let request = BrokerRequest::get(url).with_header(header::ACCEPT, "application/json");

        let reminders: Vec<Reminder> = match self.host.upstream.fetch(&request).await {
            Ok(response) if response.is_ok() => match serde_json::from_slice(&response.body) {
                Ok(reminders) => reminders,
                Err(e) => {
                    tracing::warn!("Reminders response is not a reminder list: {}", e);
                    return None;
                }
            },
            Ok(response) => {
                tracing::warn!("Reminders check returned {}", response.status);
                return None;
            }
            Err(e) => {
                tracing::debug!("Reminders check skipped, offline: {}", e);
                return None;
            }
        };

        let reminder = sync::earliest_reminder(&reminders)?;
        let notification = Notification {
            title: reminder.title.clone().unwrap_or_else(|| REMINDER_TITLE.to_string()),
            body: reminder.message.clone(),
            icon: self.config.notifications.icon.clone(),
            badge: self.config.notifications.badge.clone(),
            actions: NotificationAction::defaults(),
            data: NotificationData {
                url: reminder
                    .url
                    .clone()
                    .unwrap_or_else(|| self.config.notifications.default_url.clone()),
            },
        };

        if let Err(e) = self.host.notifications.show(notification.clone()).await {
            tracing::warn!("Failed to show reminder: {}", e);
            return None;
        }
        Some(notification)
    }

    async fn update_content(&self) -> PeriodicReport {
        let views = &self.config.manifest.offline_views;
        let results = join_all(views.iter().map(|path| self.precache(path))).await;

        let mut refreshed = 0;
        for (path, result) in views.iter().zip(results) {
            match result {
                Ok(()) => refreshed += 1,
                Err(e) => tracing::warn!("Content refresh of {} failed: {}", path, e),
            }
        }

        tracing::info!("Refreshed {}/{} offline views", refreshed, views.len());
        PeriodicReport::ContentUpdated {
            refreshed,
            failed: views.len() - refreshed,
        }
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    /// Show a notification for a push message
    pub async fn push(&self, data: &[u8]) -> Result<Notification> {
        let notification = Notification::from_push(PushPayload::parse(data), &self.config.notifications);
        self.host
            .notifications
            .show(notification.clone())
            .await
            .map_err(BrokerError::Platform)?;
        Ok(notification)
    }

    pub async fn notification_click(&self, action: Option<&str>, url: Option<&str>) -> Result<ClickOutcome> {
        let url = url.unwrap_or(&self.config.notifications.default_url);
        notify::handle_click(action, url, self.host.clients.as_ref())
            .await
            .map_err(BrokerError::Platform)
    }

    pub async fn status(&self) -> BrokerStatus {
        let cached_entries = match self.host.cache.len(&self.generation.label).await {
            Ok(len) => len,
            Err(e) => {
                tracing::warn!("Failed to count cache entries: {}", e);
                0
            }
        };

        BrokerStatus {
            generation: self.generation.clone(),
            state: self.state().await,
            cache_backend: self.host.cache.name(),
            cached_entries,
            stats: self.stats().await,
        }
    }
}

/// Forward a request without caching or queuing.
/// A network failure becomes `502 Bad Gateway`.
pub async fn pass_through(upstream: &dyn Upstream, request: &BrokerRequest) -> BrokerResponse {
    match upstream.fetch(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Pass-through to {} failed: {}", request.url, e);
            BrokerResponse::text(StatusCode::BAD_GATEWAY, "Upstream unavailable")
        }
    }
}
