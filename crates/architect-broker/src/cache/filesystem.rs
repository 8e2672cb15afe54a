//! Filesystem cache backend
//!
//! Layout: `<root>/<generation>/<digest>.json` holds the metadata (full
//! request key included) and `<root>/<generation>/<digest>.body` the raw
//! payload. The digest is the hex SHA-256 of the key, so file names have a
//! fixed length whatever the URL.

use crate::cache::{CacheStorage, CachedResponse};
use crate::request::RequestKey;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;

/// Filesystem storage backend
///
/// Persistent across restarts, suitable for single-instance deployments.
#[derive(Clone)]
pub struct FilesystemCache {
    root: PathBuf,
}

impl FilesystemCache {
    /// Create the backend, creating the root directory if needed
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create cache directory {:?}", root))?;

        Ok(Self { root })
    }

    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root.join(urlencoding::encode(generation).as_ref())
    }

    fn entry_paths(&self, generation: &str, key: &RequestKey) -> (PathBuf, PathBuf) {
        let dir = self.generation_dir(generation);
        let stem = hex::encode(Sha256::digest(key.to_string().as_bytes()));
        (
            dir.join(format!("{}.json", stem)),
            dir.join(format!("{}.body", stem)),
        )
    }
}

#[async_trait]
impl CacheStorage for FilesystemCache {
    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let (meta_path, body_path) = self.entry_paths(generation, key);

        if !meta_path.exists() {
            return Ok(None);
        }

        let meta = fs::read_to_string(&meta_path)
            .await
            .context("Failed to read cache metadata")?;
        let mut cached: CachedResponse =
            serde_json::from_str(&meta).context("Failed to deserialize cache metadata")?;

        let body = fs::read(&body_path)
            .await
            .context("Failed to read cached body")?;
        cached.body = Bytes::from(body);

        Ok(Some(cached))
    }

    async fn put(&self, generation: &str, response: CachedResponse) -> Result<()> {
        let dir = self.generation_dir(generation);
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create generation directory")?;

        let (meta_path, body_path) = self.entry_paths(generation, &response.key);

        // Body first: metadata presence marks the entry as complete
        fs::write(&body_path, &response.body)
            .await
            .context("Failed to write cached body")?;

        let meta = serde_json::to_string_pretty(&response)
            .context("Failed to serialize cache metadata")?;
        fs::write(&meta_path, meta)
            .await
            .context("Failed to write cache metadata")?;

        Ok(())
    }

    async fn generations(&self) -> Result<Vec<String>> {
        let mut labels = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .context("Failed to read cache directory")?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(label) = urlencoding::decode(name) {
                    labels.push(label.into_owned());
                }
            }
        }

        labels.sort();
        Ok(labels)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool> {
        let dir = self.generation_dir(generation);

        if !dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to delete generation {}", generation))?;

        Ok(true)
    }

    async fn len(&self, generation: &str) -> Result<usize> {
        let dir = self.generation_dir(generation);
        if !dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        let mut entries = fs::read_dir(&dir)
            .await
            .context("Failed to read generation directory")?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }

        Ok(count)
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}
