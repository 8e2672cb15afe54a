// File: architect-server/src/sse.rs
// Purpose: Server-Sent Events carrying notifications and window commands to pages

use anyhow::Result;
use architect_broker::notify::{ClientWindow, ClientWindows, Notification, NotificationSink};
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::app::AppState;

/// Messages pushed to connected pages
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Display this notification
    Notification { notification: Notification },
    /// Focus the page and navigate it
    Navigate { client_id: String, url: String },
    /// Open a new window at `url`
    OpenWindow { url: String },
}

impl ClientEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Notification { .. } => "notification",
            Self::Navigate { .. } => "navigate",
            Self::OpenWindow { .. } => "open_window",
        }
    }

    /// Navigation goes to one page only; everything else is broadcast
    pub fn is_for(&self, client_id: &str) -> bool {
        match self {
            Self::Navigate { client_id: target, .. } => target == client_id,
            _ => true,
        }
    }

    fn to_sse(&self) -> Option<Event> {
        let json = serde_json::to_string(self).ok()?;
        Some(Event::default().event(self.name()).data(json))
    }
}

/// Notification surface backed by the event stream
#[derive(Clone)]
pub struct SseNotifications {
    events: broadcast::Sender<ClientEvent>,
}

impl SseNotifications {
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl NotificationSink for SseNotifications {
    async fn show(&self, notification: Notification) -> Result<()> {
        if self
            .events
            .send(ClientEvent::Notification { notification })
            .is_err()
        {
            tracing::debug!("Notification dropped: no page is listening");
        }
        Ok(())
    }
}

/// Pages currently connected to the event stream
pub struct SseClients {
    events: broadcast::Sender<ClientEvent>,
    windows: Arc<RwLock<Vec<ClientWindow>>>,
    next_id: AtomicU64,
}

impl SseClients {
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            events,
            windows: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a page showing `url`. It stays registered until the guard drops.
    pub fn connect(&self, url: &str) -> ClientGuard {
        let id = format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut windows) = self.windows.write() {
            windows.push(ClientWindow {
                id: id.clone(),
                url: url.to_string(),
                focused: false,
            });
        }
        tracing::debug!("Page {} connected at {}", id, url);

        ClientGuard {
            id,
            windows: self.windows.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn snapshot(&self) -> Vec<ClientWindow> {
        self.windows
            .read()
            .map(|windows| windows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClientWindows for SseClients {
    async fn windows(&self) -> Vec<ClientWindow> {
        self.snapshot()
    }

    async fn focus_and_navigate(&self, id: &str, url: &str) -> Result<()> {
        {
            let mut windows = self
                .windows
                .write()
                .map_err(|_| anyhow::anyhow!("Client registry poisoned"))?;
            let Some(window) = windows.iter_mut().find(|w| w.id == id) else {
                anyhow::bail!("Page {} is no longer connected", id);
            };
            window.url = url.to_string();
            window.focused = true;
        }

        self.events
            .send(ClientEvent::Navigate {
                client_id: id.to_string(),
                url: url.to_string(),
            })
            .map_err(|_| anyhow::anyhow!("Page {} is no longer listening", id))?;
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        if self
            .events
            .send(ClientEvent::OpenWindow {
                url: url.to_string(),
            })
            .is_err()
        {
            tracing::debug!("No page to open {} from", url);
        }
        Ok(())
    }
}

/// Removes a page from the registry when its stream ends
pub struct ClientGuard {
    id: String,
    windows: Arc<RwLock<Vec<ClientWindow>>>,
}

impl ClientGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if let Ok(mut windows) = self.windows.write() {
            windows.retain(|w| w.id != self.id);
        }
        tracing::debug!("Page {} disconnected", self.id);
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Current location of the connecting page
    #[serde(default)]
    pub url: Option<String>,
}

/// SSE handler: a `connected` event with the page id, then every event
/// addressed to this page
pub async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let guard = state.clients.connect(query.url.as_deref().unwrap_or("/"));
    let client_id = guard.id().to_string();

    let hello = Event::default()
        .event("connected")
        .data(serde_json::json!({ "client_id": client_id }).to_string());

    let events = BroadcastStream::new(state.clients.subscribe()).filter_map(move |result| {
        let client_id = client_id.clone();
        async move {
            match result {
                Ok(event) if event.is_for(&client_id) => event.to_sse(),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Page {} lagged behind: {}", client_id, e);
                    None
                }
            }
        }
    });

    // The guard lives exactly as long as the stream
    let stream = stream::once(async move { hello })
        .chain(events)
        .map(move |event| {
            let _ = &guard;
            Ok::<_, Infallible>(event)
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
