// Shared fixtures for broker integration tests
#![allow(dead_code)]

use architect_broker::cache::memory::MemoryCache;
use architect_broker::notify::{MemoryClients, MemoryNotifications};
use architect_broker::{
    ActionStore, BrokerConfig, BrokerRequest, BrokerResponse, Host, Registration, Upstream,
    UpstreamError,
};
use async_trait::async_trait;
use http::{header, Method, StatusCode};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

pub const ORIGIN: &str = "https://app.local";

/// Scriptable network: a route table, a global online switch and per-path
/// failures. Every request that reaches it is recorded.
#[derive(Default)]
pub struct FakeUpstream {
    online: AtomicBool,
    routes: Mutex<HashMap<String, (StatusCode, String, String)>>,
    unreachable: Mutex<HashSet<String>>,
    seen: Mutex<Vec<(Method, String)>>,
}

impl FakeUpstream {
    pub fn online() -> Arc<Self> {
        let upstream = Self::default();
        upstream.online.store(true, Ordering::SeqCst);
        Arc::new(upstream)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn route(&self, path: &str, content_type: &str, body: &str) {
        self.route_status(path, StatusCode::OK, content_type, body);
    }

    pub fn route_status(&self, path: &str, status: StatusCode, content_type: &str, body: &str) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            (status, content_type.to_string(), body.to_string()),
        );
    }

    /// Connection failures for one path even while online
    pub fn fail(&self, path: &str) {
        self.unreachable.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self, path: &str) {
        self.unreachable.lock().unwrap().remove(path);
    }

    pub fn seen(&self) -> Vec<(Method, String)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_count(&self, method: &Method, path: &str) -> usize {
        self.seen()
            .iter()
            .filter(|(m, p)| m == method && p == path)
            .count()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch(&self, request: &BrokerRequest) -> Result<BrokerResponse, UpstreamError> {
        let path = request.url.path().to_string();
        self.seen
            .lock()
            .unwrap()
            .push((request.method.clone(), path.clone()));

        if !self.online.load(Ordering::SeqCst) || self.unreachable.lock().unwrap().contains(&path) {
            return Err(UpstreamError::Network("connection refused".to_string()));
        }

        let route = self.routes.lock().unwrap().get(&path).cloned();
        Ok(match route {
            Some((status, content_type, body)) => {
                BrokerResponse::new(status, body).with_header(header::CONTENT_TYPE, &content_type)
            }
            None => BrokerResponse::text(StatusCode::NOT_FOUND, "not found"),
        })
    }
}

/// Everything a test needs to drive and observe a registration
pub struct Harness {
    pub registration: Registration,
    pub upstream: Arc<FakeUpstream>,
    pub cache: Arc<MemoryCache>,
    pub store: ActionStore,
    pub notifications: Arc<MemoryNotifications>,
    pub clients: Arc<MemoryClients>,
}

impl Harness {
    pub async fn new() -> Self {
        let upstream = FakeUpstream::online();
        serve_site(&upstream);

        let cache = Arc::new(MemoryCache::new());
        let store = ActionStore::in_memory().await.unwrap();
        let notifications = Arc::new(MemoryNotifications::new());
        let clients = Arc::new(MemoryClients::new());

        let host = Host {
            cache: cache.clone(),
            store: store.clone(),
            upstream: upstream.clone(),
            notifications: notifications.clone(),
            clients: clients.clone(),
        };

        Self {
            registration: Registration::new(host),
            upstream,
            cache,
            store,
            notifications,
            clients,
        }
    }

    /// New harness with generation `label` installed and active
    pub async fn active(label: &str) -> Self {
        let harness = Self::new().await;
        harness.registration.register(config(label)).await.unwrap();
        harness
    }

    pub async fn fetch(&self, request: BrokerRequest) -> BrokerResponse {
        self.registration.handle_fetch(request).await.unwrap()
    }
}

/// Small manifest against the fake origin
pub fn config(label: &str) -> BrokerConfig {
    let mut config = BrokerConfig::default();
    config.upstream.origin = ORIGIN.to_string();
    config.cache.generation = label.to_string();
    config.manifest.static_assets = vec!["/".to_string(), "/static/css/style.css".to_string()];
    config.manifest.offline_page = "/offline".to_string();
    config.manifest.offline_views = vec!["/dashboard".to_string(), "/nlp-techniques".to_string()];
    config
}

pub fn serve_site(upstream: &FakeUpstream) {
    upstream.route("/", "text/html", "<h1>Home</h1>");
    upstream.route("/static/css/style.css", "text/css", "body { margin: 0 }");
    upstream.route("/offline", "text/html", "<h1>You are offline</h1>");
    upstream.route("/dashboard", "text/html", "<h1>Dashboard</h1>");
    upstream.route("/nlp-techniques", "text/html", "<h1>Techniques</h1>");
}

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn page(path: &str) -> BrokerRequest {
    BrokerRequest::get(url(path)).with_header(header::ACCEPT, "text/html,application/xhtml+xml")
}

pub fn api_get(path: &str) -> BrokerRequest {
    BrokerRequest::get(url(path)).with_header(header::ACCEPT, "application/json")
}

pub fn api_write(method: Method, path: &str, body: &str) -> BrokerRequest {
    BrokerRequest::new(method, url(path))
        .with_header(header::CONTENT_TYPE, "application/json")
        .with_body(body.to_string())
}
