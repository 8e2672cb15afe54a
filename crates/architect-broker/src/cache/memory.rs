//! In-memory cache backend

use crate::cache::{CacheStorage, CachedResponse};
use crate::request::RequestKey;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Bucket = HashMap<RequestKey, CachedResponse>;

/// In-memory storage backend
///
/// Generations are nested maps behind one lock. Fast but non-persistent.
#[derive(Clone, Default)]
pub struct MemoryCache {
    generations: Arc<RwLock<HashMap<String, Bucket>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes stored across generations
    pub async fn total_bytes(&self) -> usize {
        self.generations
            .read()
            .await
            .values()
            .flat_map(|bucket| bucket.values())
            .map(CachedResponse::size_bytes)
            .sum()
    }
}

#[async_trait]
impl CacheStorage for MemoryCache {
    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let generations = self.generations.read().await;
        Ok(generations
            .get(generation)
            .and_then(|bucket| bucket.get(key))
            .cloned())
    }

    async fn put(&self, generation: &str, response: CachedResponse) -> Result<()> {
        let mut generations = self.generations.write().await;
        generations
            .entry(generation.to_string())
            .or_default()
            .insert(response.key.clone(), response);
        Ok(())
    }

    async fn generations(&self) -> Result<Vec<String>> {
        let generations = self.generations.read().await;
        let mut labels: Vec<String> = generations.keys().cloned().collect();
        labels.sort();
        Ok(labels)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool> {
        let mut generations = self.generations.write().await;
        Ok(generations.remove(generation).is_some())
    }

    async fn len(&self, generation: &str) -> Result<usize> {
        let generations = self.generations.read().await;
        Ok(generations.get(generation).map_or(0, HashMap::len))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
