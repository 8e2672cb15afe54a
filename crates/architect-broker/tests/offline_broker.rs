// Integration tests for the broker against a scripted network
// Run with: cargo test -p architect-broker --test offline_broker

mod common;

use architect_broker::fallback::OFFLINE_TEXT;
use architect_broker::request::{CACHE_HIT_HEADER, OFFLINE_FALLBACK_HEADER};
use architect_broker::{
    BrokerError, BrokerRequest, CacheStorage, LifecycleState, RequestKey,
};
use common::{api_get, api_write, config, page, url, Harness};
use http::{Method, StatusCode};
use pretty_assertions::assert_eq;

fn header<'a>(response: &'a architect_broker::BrokerResponse, name: &str) -> Option<&'a str> {
    response.headers.get(name).and_then(|v| v.to_str().ok())
}

// ----------------------------------------------------------------------------
// Reads
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_visited_page_is_served_byte_for_byte_offline() {
    let harness = Harness::active("v1").await;
    harness
        .upstream
        .route("/journal", "text/html; charset=utf-8", "<h1>Journal</h1>\n<p>entry</p>");

    let live = harness.fetch(page("/journal")).await;
    assert_eq!(live.status, StatusCode::OK);

    harness.upstream.set_online(false);
    let offline = harness.fetch(page("/journal")).await;

    assert_eq!(offline.status, StatusCode::OK);
    assert_eq!(offline.body, live.body);
    assert_eq!(offline.content_type(), Some("text/html; charset=utf-8"));
    assert_eq!(header(&offline, CACHE_HIT_HEADER), Some("hit"));
}

#[tokio::test]
async fn test_network_wins_over_cache_while_online() {
    let harness = Harness::active("v1").await;
    harness.upstream.route("/dashboard", "text/html", "<h1>Dashboard v2</h1>");

    let response = harness.fetch(page("/dashboard")).await;

    assert_eq!(response.body, "<h1>Dashboard v2</h1>");
    assert_eq!(header(&response, CACHE_HIT_HEADER), None);
}

#[tokio::test]
async fn test_uncached_navigation_gets_offline_page() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    let response = harness.fetch(page("/never-visited")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "<h1>You are offline</h1>");
    assert_eq!(header(&response, OFFLINE_FALLBACK_HEADER), Some("1"));
}

#[tokio::test]
async fn test_uncached_asset_gets_503_text() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    let response = harness
        .fetch(BrokerRequest::get(url("/static/img/missing.png")))
        .await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body, OFFLINE_TEXT);
    assert_eq!(header(&response, OFFLINE_FALLBACK_HEADER), Some("1"));
}

#[tokio::test]
async fn test_only_200_responses_are_cached() {
    let harness = Harness::active("v1").await;
    harness.upstream.route_status(
        "/api/user/profile",
        StatusCode::INTERNAL_SERVER_ERROR,
        "application/json",
        r#"{"error":"boom"}"#,
    );

    let live = harness.fetch(api_get("/api/user/profile")).await;
    assert_eq!(live.status, StatusCode::INTERNAL_SERVER_ERROR);

    let generation = "v1";
    let key = api_get("/api/user/profile").key();
    assert!(harness.cache.get(generation, &key).await.unwrap().is_none());

    harness.upstream.set_online(false);
    let offline = harness.fetch(api_get("/api/user/profile")).await;
    let body = offline.json_body().unwrap();
    assert_eq!(body["profile"]["username"], "Offline User");
}

#[tokio::test]
async fn test_techniques_fallback_when_nothing_cached() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    let response = harness.fetch(api_get("/api/techniques")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(header(&response, OFFLINE_FALLBACK_HEADER), Some("1"));

    let body = response.json_body().unwrap();
    assert_eq!(body["offline"], true);
    let ids: Vec<&str> = body["techniques"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["reframing", "anchoring", "pattern_interruption"]);
}

#[tokio::test]
async fn test_cached_api_read_beats_fallback() {
    let harness = Harness::active("v1").await;
    harness
        .upstream
        .route("/api/techniques", "application/json", r#"{"techniques":[{"id":"swish"}]}"#);

    harness.fetch(api_get("/api/techniques")).await;
    harness.upstream.set_online(false);

    let response = harness.fetch(api_get("/api/techniques")).await;
    assert_eq!(response.body, r#"{"techniques":[{"id":"swish"}]}"#);
    assert_eq!(header(&response, OFFLINE_FALLBACK_HEADER), None);
}

#[tokio::test]
async fn test_unknown_api_read_gets_generic_offline_payload() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    let response = harness.fetch(api_get("/api/chat/history")).await;
    let body = response.json_body().unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body["offline"], true);
    assert!(body["message"].as_str().unwrap().contains("offline"));
}

#[tokio::test]
async fn test_cross_origin_requests_are_not_intercepted() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    let request = BrokerRequest::get("https://cdn.example.com/lib.js".parse().unwrap());
    let response = harness.fetch(request).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(harness.store.counts().await.unwrap().unsynced, 0);
}

#[tokio::test]
async fn test_non_api_writes_pass_through() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    let response = harness
        .fetch(api_write(Method::POST, "/login", "user=a"))
        .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(harness.store.unsynced().await.unwrap().is_empty());
}

// ----------------------------------------------------------------------------
// Writes and replay
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_offline_write_is_queued_and_acknowledged() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    let response = harness
        .fetch(api_write(Method::POST, "/api/exercises/3/progress", r#"{"step":2}"#))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(header(&response, OFFLINE_FALLBACK_HEADER), Some("1"));
    let body = response.json_body().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["offline"], true);

    let pending = harness.store.unsynced().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(body["queued_id"], pending[0].id);
    assert_eq!(pending[0].method, "POST");
    assert_eq!(pending[0].path(), "/api/exercises/3/progress");
    assert_eq!(pending[0].body, br#"{"step":2}"#.to_vec());
}

#[tokio::test]
async fn test_online_write_is_not_queued() {
    let harness = Harness::active("v1").await;
    harness
        .upstream
        .route("/api/user/preferences", "application/json", r#"{"saved":true}"#);

    let response = harness
        .fetch(api_write(Method::PUT, "/api/user/preferences", r#"{"theme":"dark"}"#))
        .await;

    assert_eq!(response.body, r#"{"saved":true}"#);
    assert!(harness.store.unsynced().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_write_is_returned_not_queued() {
    let harness = Harness::active("v1").await;
    harness.upstream.route_status(
        "/api/exercises/9/progress",
        StatusCode::UNPROCESSABLE_ENTITY,
        "application/json",
        r#"{"error":"invalid"}"#,
    );

    let response = harness
        .fetch(api_write(Method::POST, "/api/exercises/9/progress", "{}"))
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(harness.store.unsynced().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_failure_while_queuing_is_an_error() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);
    harness.store.close().await;

    let result = harness
        .registration
        .handle_fetch(api_write(Method::POST, "/api/exercises/1/progress", "{}"))
        .await;

    assert!(matches!(result, Err(BrokerError::Store(_))));
}

#[tokio::test]
async fn test_partial_replay_keeps_failures_for_next_sync() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);

    for path in [
        "/api/exercises/1/progress",
        "/api/exercises/2/progress",
        "/api/user/preferences",
    ] {
        harness.fetch(api_write(Method::POST, path, "{}")).await;
    }
    assert_eq!(harness.store.unsynced().await.unwrap().len(), 3);

    harness.upstream.set_online(true);
    for path in [
        "/api/exercises/1/progress",
        "/api/exercises/2/progress",
        "/api/user/preferences",
    ] {
        harness.upstream.route(path, "application/json", r#"{"ok":true}"#);
    }
    harness.upstream.fail("/api/exercises/2/progress");

    let broker = harness.registration.active().await.unwrap();
    let report = broker.sync("sync-all".parse().unwrap()).await;
    assert_eq!((report.attempted, report.synced, report.failed()), (3, 2, 1));

    let remaining = harness.store.unsynced().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path(), "/api/exercises/2/progress");

    harness.upstream.heal("/api/exercises/2/progress");
    let report = broker.sync("sync-all".parse().unwrap()).await;
    assert_eq!((report.attempted, report.synced), (1, 1));

    // Synced actions are not sent again: one failed live attempt + one replay
    assert_eq!(
        harness
            .upstream
            .seen_count(&Method::POST, "/api/exercises/1/progress"),
        2
    );
    assert_eq!(harness.store.counts().await.unwrap().synced, 3);
}

#[tokio::test]
async fn test_sync_tag_selects_actions_by_path() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);
    harness
        .fetch(api_write(Method::POST, "/api/exercises/1/progress", "{}"))
        .await;
    harness
        .fetch(api_write(Method::PATCH, "/api/user/preferences", "{}"))
        .await;

    harness.upstream.set_online(true);
    harness
        .upstream
        .route("/api/exercises/1/progress", "application/json", "{}");
    harness
        .upstream
        .route("/api/user/preferences", "application/json", "{}");

    let broker = harness.registration.active().await.unwrap();
    let report = broker.sync("sync-user-data".parse().unwrap()).await;

    assert_eq!((report.attempted, report.synced), (1, 1));
    let remaining = harness.store.unsynced().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path(), "/api/exercises/1/progress");
}

#[tokio::test]
async fn test_replay_rejected_by_server_stays_unsynced() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);
    harness
        .fetch(api_write(Method::DELETE, "/api/exercises/4", ""))
        .await;

    harness.upstream.set_online(true);
    harness.upstream.route_status(
        "/api/exercises/4",
        StatusCode::CONFLICT,
        "application/json",
        "{}",
    );

    let broker = harness.registration.active().await.unwrap();
    let report = broker.sync("sync-exercise-progress".parse().unwrap()).await;

    assert_eq!((report.attempted, report.synced), (1, 0));
    assert_eq!(harness.store.unsynced().await.unwrap().len(), 1);
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_activation_purges_older_generations() {
    let harness = Harness::active("v1").await;
    let v1 = harness.registration.active().await.unwrap();

    harness.registration.register(config("v2")).await.unwrap();

    let active = harness.registration.active().await.unwrap();
    assert_eq!(active.generation().label, "v2");
    assert_eq!(v1.state().await, LifecycleState::Superseded);
    assert_eq!(harness.cache.generations().await.unwrap(), vec!["v2".to_string()]);
}

#[tokio::test]
async fn test_content_cached_only_by_old_generation_is_gone() {
    let harness = Harness::active("v1").await;
    harness
        .upstream
        .route("/journal", "text/html", "<h1>Journal from v1</h1>");
    harness
        .upstream
        .route("/static/img/journal.png", "image/png", "png bytes");
    harness.fetch(page("/journal")).await;
    harness.fetch(BrokerRequest::get(url("/static/img/journal.png"))).await;

    harness.registration.register(config("v2")).await.unwrap();
    harness.upstream.set_online(false);

    let response = harness.fetch(page("/journal")).await;
    assert_eq!(response.body, "<h1>You are offline</h1>");
    assert_eq!(header(&response, OFFLINE_FALLBACK_HEADER), Some("1"));
    assert_eq!(header(&response, CACHE_HIT_HEADER), Some("hit"));

    let asset = harness
        .fetch(BrokerRequest::get(url("/static/img/journal.png")))
        .await;
    assert_eq!(asset.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_failed_install_leaves_previous_version_serving() {
    let harness = Harness::active("v1").await;
    harness.upstream.fail("/static/css/style.css");

    let result = harness.registration.register(config("v2")).await;

    match result {
        Err(BrokerError::Install { generation, url, .. }) => {
            assert_eq!(generation, "v2");
            assert_eq!(url, "/static/css/style.css");
        }
        other => panic!("expected install failure, got {:?}", other.map(|_| ())),
    }

    let active = harness.registration.active().await.unwrap();
    assert_eq!(active.generation().label, "v1");
    assert!(harness.registration.waiting().await.is_none());
    assert_eq!(harness.cache.generations().await.unwrap(), vec!["v1".to_string()]);

    harness.upstream.set_online(false);
    let response = harness.fetch(page("/")).await;
    assert_eq!(response.body, "<h1>Home</h1>");
}

#[tokio::test]
async fn test_missing_optional_view_does_not_fail_install() {
    let harness = Harness::new().await;
    harness.upstream.fail("/nlp-techniques");

    let broker = harness.registration.register(config("v1")).await.unwrap();

    assert_eq!(broker.state().await, LifecycleState::Active);
    let key = RequestKey::new(&Method::GET, &url("/dashboard"));
    assert!(harness.cache.get("v1", &key).await.unwrap().is_some());
    let key = RequestKey::new(&Method::GET, &url("/nlp-techniques"));
    assert!(harness.cache.get("v1", &key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_waiting_version_does_not_intercept() {
    let harness = Harness::new().await;
    let mut cfg = config("v1");
    cfg.lifecycle.skip_waiting = false;

    let broker = harness.registration.register(cfg).await.unwrap();
    assert_eq!(broker.state().await, LifecycleState::Waiting);

    harness.upstream.set_online(false);
    let response = harness.fetch(page("/")).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);

    let activation = harness.registration.skip_waiting().await.unwrap().unwrap();
    assert_eq!(activation.generation, "v1");

    let response = harness.fetch(page("/")).await;
    assert_eq!(response.body, "<h1>Home</h1>");
}

#[tokio::test]
async fn test_active_label_cannot_be_reinstalled() {
    let harness = Harness::active("v1").await;

    let result = harness.registration.register(config("v1")).await;

    assert!(matches!(result, Err(BrokerError::Lifecycle(_))));
    assert_eq!(harness.cache.generations().await.unwrap(), vec!["v1".to_string()]);
}

#[tokio::test]
async fn test_waiting_label_cannot_be_reinstalled() {
    let harness = Harness::active("v1").await;
    let mut waiting = config("v2");
    waiting.lifecycle.skip_waiting = false;
    harness.registration.register(waiting.clone()).await.unwrap();
    let cached = harness.cache.len("v2").await.unwrap();

    harness.upstream.fail("/static/css/style.css");
    let result = harness.registration.register(waiting).await;

    assert!(matches!(result, Err(BrokerError::Lifecycle(_))));
    assert_eq!(harness.cache.len("v2").await.unwrap(), cached);

    let activation = harness.registration.skip_waiting().await.unwrap().unwrap();
    assert_eq!(activation.generation, "v2");

    harness.upstream.set_online(false);
    let response = harness.fetch(page("/static/css/style.css")).await;
    assert_eq!(response.body, "body { margin: 0 }");
}

#[tokio::test]
async fn test_status_reports_cache_activity() {
    let harness = Harness::active("v1").await;
    harness.upstream.set_online(false);
    harness.fetch(page("/dashboard")).await;
    harness.fetch(page("/nowhere")).await;

    let status = harness.registration.active().await.unwrap().status().await;

    assert_eq!(status.state, LifecycleState::Active);
    assert_eq!(status.cache_backend, "memory");
    assert_eq!(status.cached_entries, 5);
    assert_eq!((status.stats.hits, status.stats.misses), (1, 1));
    assert_eq!(status.stats.fallbacks, 1);
}
