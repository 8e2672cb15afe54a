// File: architect-server/src/app.rs
// Purpose: Router wiring, the proxy fallback and /__broker control endpoints

use architect_broker::store::QueueCounts;
use architect_broker::{
    BrokerError, BrokerEvent, BrokerRequest, BrokerResponse, BrokerStatus, EventOutcome,
    PendingAction, Registration,
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::sse::{events_handler, SseClients};

/// Largest request body the proxy buffers
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<Registration>,
    /// Upstream origin every proxied request is resolved against
    pub origin: Url,
    pub clients: Arc<SseClients>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/__broker/sync/:tag", post(sync_handler))
        .route("/__broker/periodic-sync/:tag", post(periodic_sync_handler))
        .route("/__broker/push", post(push_handler))
        .route("/__broker/notification-click", post(notification_click_handler))
        .route("/__broker/skip-waiting", post(skip_waiting_handler))
        .route("/__broker/status", get(status_handler))
        .route("/__broker/pending", get(pending_handler))
        .route("/__broker/events", get(events_handler))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Broker failures surfaced over HTTP
pub struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BrokerError::Lifecycle(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!("Request failed: {}", self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ----------------------------------------------------------------------------
// Proxy
// ----------------------------------------------------------------------------

/// Every request outside `/__broker/` goes through the broker
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let url = match request_url(&state.origin, &parts.uri) {
        Ok(url) => url,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid request target: {}", e))
                .into_response()
        }
    };

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };

    let request = BrokerRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        body,
    };

    match state.registration.handle_fetch(request).await {
        Ok(response) => into_http(response),
        Err(e) => ApiError(e).into_response(),
    }
}

/// The proxy fronts a single origin: only path and query of the target are kept
fn request_url(origin: &Url, uri: &Uri) -> Result<Url, url::ParseError> {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    origin.join(target)
}

fn into_http(response: BrokerResponse) -> Response {
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = response.status;
    *http.headers_mut() = response.headers;
    http
}

// ----------------------------------------------------------------------------
// Control endpoints
// ----------------------------------------------------------------------------

fn outcome_response(outcome: EventOutcome) -> Response {
    match outcome {
        EventOutcome::Installed { generation } => Json(json!({ "installed": generation })).into_response(),
        EventOutcome::Activated(activation) => Json(json!({ "activated": activation })).into_response(),
        EventOutcome::Response(response) => into_http(response),
        EventOutcome::Synced(report) => Json(report).into_response(),
        EventOutcome::Periodic(report) => Json(report).into_response(),
        EventOutcome::Notified(notification) => Json(notification).into_response(),
        EventOutcome::Clicked(click) => Json(click).into_response(),
        EventOutcome::Ignored(reason) => {
            (StatusCode::NOT_FOUND, Json(json!({ "ignored": reason }))).into_response()
        }
    }
}

async fn sync_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state.registration.dispatch(BrokerEvent::Sync(tag)).await?;
    Ok(outcome_response(outcome))
}

async fn periodic_sync_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state
        .registration
        .dispatch(BrokerEvent::PeriodicSync(tag))
        .await?;
    Ok(outcome_response(outcome))
}

async fn push_handler(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let outcome = state.registration.dispatch(BrokerEvent::Push(body)).await?;
    Ok(outcome_response(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClickBody {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

async fn notification_click_handler(
    State(state): State<AppState>,
    Json(click): Json<ClickBody>,
) -> Result<Response, ApiError> {
    let outcome = state
        .registration
        .dispatch(BrokerEvent::NotificationClick {
            action: click.action,
            url: click.url,
        })
        .await?;
    Ok(outcome_response(outcome))
}

async fn skip_waiting_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let outcome = state.registration.dispatch(BrokerEvent::Activate).await?;
    Ok(outcome_response(outcome))
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub active: Option<BrokerStatus>,
    pub waiting: Option<String>,
    pub generations: Vec<String>,
    pub queue: QueueCounts,
}

async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusBody>, ApiError> {
    let registration = &state.registration;
    let host = registration.host();

    let active = match registration.active().await {
        Some(broker) => Some(broker.status().await),
        None => None,
    };
    let waiting = registration
        .waiting()
        .await
        .map(|broker| broker.generation().label.clone());
    let generations = host.cache.generations().await.map_err(BrokerError::Cache)?;
    let queue = host.store.counts().await?;

    Ok(Json(StatusBody {
        active,
        waiting,
        generations,
        queue,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    /// Include actions that were already synced
    #[serde(default)]
    pub all: bool,
}

async fn pending_handler(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<PendingAction>>, ApiError> {
    let store = &state.registration.host().store;
    let actions = if query.all {
        store.all().await?
    } else {
        store.unsynced().await?
    };
    Ok(Json(actions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/journal?page=2", "https://app.local/journal?page=2")]
    #[case("/", "https://app.local/")]
    #[case("http://localhost:3000/x?y=1", "https://app.local/x?y=1")]
    fn test_request_url(#[case] target: &str, #[case] expected: &str) {
        let origin = Url::parse("https://app.local").unwrap();
        let uri: Uri = target.parse().unwrap();
        assert_eq!(request_url(&origin, &uri).unwrap().as_str(), expected);
    }
}
