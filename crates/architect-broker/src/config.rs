// File: architect-broker/src/config.rs
// Purpose: Configuration parsing from broker.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Listener of the proxy binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// The host web application the broker fronts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Scheme + host + port; requests on any other origin are not intercepted
    #[serde(default = "default_origin")]
    pub origin: String,
}

/// Response cache store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Label of the generation this broker version installs
    #[serde(default = "default_generation")]
    pub generation: String,

    #[serde(default)]
    pub backend: CacheBackend,
}

/// Storage backend for cached responses
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-memory storage (fast, lost on restart)
    #[default]
    Memory,

    /// One directory per generation on disk
    Filesystem {
        #[serde(default = "default_cache_path")]
        path: PathBuf,
    },
}

/// Durable record store for pending actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

/// What gets cached at install time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Mandatory: a single failure aborts the install
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Served to HTML requests with no network and no cache entry.
    /// Always part of the mandatory set.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Optional: cached best-effort at install, refreshed by `update-content`
    #[serde(default = "default_offline_views")]
    pub offline_views: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Path prefix distinguishing API traffic from page traffic
    #[serde(default = "default_api_prefix")]
    pub prefix: String,

    /// Polled by the `check-reminders` periodic sync
    #[serde(default = "default_reminders_path")]
    pub reminders_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Activate right after a successful install instead of waiting
    #[serde(default = "default_true")]
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_icon")]
    pub icon: String,

    #[serde(default = "default_badge")]
    pub badge: String,

    /// Navigation target when a notification carries no url
    #[serde(default = "default_notification_url")]
    pub default_url: String,
}

// Default values
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_origin() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_generation() -> String {
    "inner-architect-v1".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".architect/cache")
}

fn default_database_url() -> String {
    "sqlite://.architect/offline.db".to_string()
}

fn default_static_assets() -> Vec<String> {
    vec![
        "/".to_string(),
        "/static/css/style.css".to_string(),
        "/static/css/design-system.css".to_string(),
        "/static/js/main.js".to_string(),
        "/static/js/offline.js".to_string(),
        "/static/manifest.json".to_string(),
        "/static/icons/icon-192x192.png".to_string(),
        "/static/icons/icon-512x512.png".to_string(),
    ]
}

fn default_offline_page() -> String {
    "/offline".to_string()
}

fn default_offline_views() -> Vec<String> {
    vec![
        "/nlp-techniques".to_string(),
        "/dashboard".to_string(),
        "/profile".to_string(),
        "/static/data/techniques.json".to_string(),
        "/static/data/exercises.json".to_string(),
    ]
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_reminders_path() -> String {
    "/api/reminders/due".to_string()
}

fn default_icon() -> String {
    "/static/icons/icon-192x192.png".to_string()
}

fn default_badge() -> String {
    "/static/icons/badge-72x72.png".to_string()
}

fn default_notification_url() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            backend: CacheBackend::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            static_assets: default_static_assets(),
            offline_page: default_offline_page(),
            offline_views: default_offline_views(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: default_api_prefix(),
            reminders_path: default_reminders_path(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { skip_waiting: true }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: default_icon(),
            badge: default_badge(),
            default_url: default_notification_url(),
        }
    }
}

impl ManifestConfig {
    /// Static assets plus the offline page, deduplicated, in declaration order
    pub fn mandatory(&self) -> Vec<String> {
        let mut paths = self.static_assets.clone();
        if !paths.contains(&self.offline_page) {
            paths.push(self.offline_page.clone());
        }
        paths
    }
}

impl BrokerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Missing file means defaults
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: BrokerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.origin().with_context(|| {
            format!("Invalid upstream origin in {:?}: {}", path, config.upstream.origin)
        })?;

        Ok(config)
    }

    /// Load configuration from the default path (./broker.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("broker.toml")
    }

    /// Parsed upstream origin
    pub fn origin(&self) -> std::result::Result<Url, url::ParseError> {
        Url::parse(&self.upstream.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.generation, "inner-architect-v1");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.api.prefix, "/api/");
        assert!(config.lifecycle.skip_waiting);
        assert!(config.manifest.mandatory().contains(&"/offline".to_string()));
    }

    #[test]
    fn test_empty_config() {
        let config = toml::from_str::<BrokerConfig>("").unwrap_or_default();
        assert_eq!(config.upstream.origin, "http://127.0.0.1:5000");
        assert_eq!(config.manifest.offline_page, "/offline");
    }

    #[test]
    fn test_custom_sections() {
        let toml = r#"
            [upstream]
            origin = "https://innerarchitect.app"

            [cache]
            generation = "inner-architect-v7"
            backend = { type = "filesystem", path = "/var/cache/architect" }

            [manifest]
            static_assets = ["/static/app.css"]
            offline_page = "/static/app.css"

            [lifecycle]
            skip_waiting = false
        "#;
        let config: BrokerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.generation, "inner-architect-v7");
        assert_eq!(
            config.cache.backend,
            CacheBackend::Filesystem {
                path: PathBuf::from("/var/cache/architect")
            }
        );
        assert!(!config.lifecycle.skip_waiting);
        // Offline page already listed, not duplicated
        assert_eq!(config.manifest.mandatory(), vec!["/static/app.css".to_string()]);
        // Untouched sections keep their defaults
        assert_eq!(config.api.reminders_path, "/api/reminders/due");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = BrokerConfig::load("/nonexistent/broker.toml").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_load_rejects_bad_origin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upstream]\norigin = \"not a url\"").unwrap();
        assert!(BrokerConfig::load(file.path()).is_err());
    }
}
