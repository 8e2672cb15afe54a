//! Response cache store
//!
//! Cached responses live in named buckets ("generations"). Exactly one
//! generation is current; the broker reads and writes only that one and
//! purges the rest when a new version activates.

use crate::config::CacheBackend;
use crate::request::{BrokerResponse, RequestKey, CACHE_HIT_HEADER};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod filesystem;
pub mod memory;

/// Response headers worth replaying from the cache
const REPLAYED_HEADERS: &[HeaderName] = &[
    header::CONTENT_TYPE,
    header::CONTENT_LANGUAGE,
    header::CACHE_CONTROL,
    header::ETAG,
    header::LAST_MODIFIED,
];

/// A successful read response kept for offline replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key: RequestKey,

    pub status: u16,

    /// Subset of the original headers (see `REPLAYED_HEADERS`)
    pub headers: Vec<(String, String)>,

    pub captured_at: DateTime<Utc>,

    /// Raw payload; backends persist it outside the JSON metadata
    #[serde(skip)]
    pub body: Bytes,
}

impl CachedResponse {
    /// Snapshot a live response
    pub fn capture(key: RequestKey, response: &BrokerResponse) -> Self {
        let headers = REPLAYED_HEADERS
            .iter()
            .filter_map(|name| {
                let value = response.headers.get(name)?.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect();

        Self {
            key,
            status: response.status.as_u16(),
            headers,
            captured_at: Utc::now(),
            body: response.body.clone(),
        }
    }

    /// Rebuild a response carrying exactly the captured payload
    pub fn to_response(&self) -> BrokerResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers.insert(
            HeaderName::from_static(CACHE_HIT_HEADER),
            HeaderValue::from_static("hit"),
        );

        BrokerResponse {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: self.body.clone(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.body.len()
    }
}

/// The currently active named cache bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheGeneration {
    pub label: String,
    pub created_at: DateTime<Utc>,
}

impl CacheGeneration {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            created_at: Utc::now(),
        }
    }
}

/// Trait for cache storage backends
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Look up a response in one generation
    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

    /// Store a response, replacing any previous entry for the key
    async fn put(&self, generation: &str, response: CachedResponse) -> Result<()>;

    /// Labels of every generation present in the store
    async fn generations(&self) -> Result<Vec<String>>;

    /// Drop a whole generation. Returns whether it existed.
    async fn delete_generation(&self, generation: &str) -> Result<bool>;

    /// Number of entries in a generation
    async fn len(&self, generation: &str) -> Result<usize>;

    /// Backend name, for logs and status output
    fn name(&self) -> &'static str;
}

/// Build the configured backend
pub async fn open_storage(backend: &CacheBackend) -> Result<Arc<dyn CacheStorage>> {
    match backend {
        CacheBackend::Memory => Ok(Arc::new(memory::MemoryCache::new())),
        CacheBackend::Filesystem { path } => {
            let storage = filesystem::FilesystemCache::new(path.clone()).await?;
            Ok(Arc::new(storage))
        }
    }
}

/// Counters for cache behavior of one broker
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Offline lookups answered from the cache
    pub hits: u64,

    /// Offline lookups with no entry
    pub misses: u64,

    /// Live responses copied into the cache
    pub stored: u64,

    /// Responses synthesized by the broker
    pub fallbacks: u64,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
