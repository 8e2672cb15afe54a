// File: architect-broker/src/notify.rs
// Purpose: Push notifications and notification-click navigation

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::NotificationConfig;

pub const DEFAULT_TITLE: &str = "The Inner Architect";
pub const DEFAULT_BODY: &str = "You have a new notification.";

/// Action id that closes the notification without navigating
pub const DISMISS_ACTION: &str = "dismiss";

/// A button on a notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
        }
    }

    /// `open` + `dismiss`, used when a push carries no actions
    pub fn defaults() -> Vec<Self> {
        vec![Self::new("open", "Open"), Self::new(DISMISS_ACTION, "Dismiss")]
    }
}

/// JSON body of a push message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushPayload {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_body")]
    pub body: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub actions: Option<Vec<NotificationAction>>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_body() -> String {
    DEFAULT_BODY.to_string()
}

impl PushPayload {
    /// Parse raw push data. Non-JSON data becomes the body of a default notification.
    pub fn parse(raw: &[u8]) -> Self {
        match serde_json::from_slice(raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Push payload is not valid JSON: {}", e);
                let text = String::from_utf8_lossy(raw).trim().to_string();
                Self {
                    title: default_title(),
                    body: if text.is_empty() { default_body() } else { text },
                    url: None,
                    actions: None,
                }
            }
        }
    }
}

/// Navigation data carried by a notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationData {
    pub url: String,
}

/// A notification ready to be shown by the platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub actions: Vec<NotificationAction>,
    pub data: NotificationData,
}

impl Notification {
    pub fn from_push(payload: PushPayload, config: &NotificationConfig) -> Self {
        Self {
            title: payload.title,
            body: payload.body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            actions: payload.actions.unwrap_or_else(NotificationAction::defaults),
            data: NotificationData {
                url: payload.url.unwrap_or_else(|| config.default_url.clone()),
            },
        }
    }
}

/// Surface that displays notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: Notification) -> Result<()>;
}

/// An open page of the application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
    pub focused: bool,
}

/// Open application windows, as seen by the broker
#[async_trait]
pub trait ClientWindows: Send + Sync {
    async fn windows(&self) -> Vec<ClientWindow>;

    async fn focus_and_navigate(&self, id: &str, url: &str) -> Result<()>;

    async fn open_window(&self, url: &str) -> Result<()>;
}

/// What a notification click ended up doing
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    Dismissed,
    Focused { client_id: String, url: String },
    Opened { url: String },
}

/// React to a click on a notification (or one of its action buttons)
///
/// An existing window already at `url` is preferred, then any window.
pub async fn handle_click(
    action: Option<&str>,
    url: &str,
    clients: &dyn ClientWindows,
) -> Result<ClickOutcome> {
    if action == Some(DISMISS_ACTION) {
        return Ok(ClickOutcome::Dismissed);
    }

    let windows = clients.windows().await;
    let target = windows
        .iter()
        .find(|w| w.url == url)
        .or_else(|| windows.first());

    match target {
        Some(window) => {
            clients.focus_and_navigate(&window.id, url).await?;
            Ok(ClickOutcome::Focused {
                client_id: window.id.clone(),
                url: url.to_string(),
            })
        }
        None => {
            clients.open_window(url).await?;
            Ok(ClickOutcome::Opened {
                url: url.to_string(),
            })
        }
    }
}

/// Notification sink that keeps everything it was asked to show
#[derive(Clone, Default)]
pub struct MemoryNotifications {
    shown: Arc<RwLock<Vec<Notification>>>,
}

impl MemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn shown(&self) -> Vec<Notification> {
        self.shown.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifications {
    async fn show(&self, notification: Notification) -> Result<()> {
        self.shown.write().await.push(notification);
        Ok(())
    }
}

/// In-process window registry
#[derive(Clone, Default)]
pub struct MemoryClients {
    windows: Arc<RwLock<Vec<ClientWindow>>>,
}

impl MemoryClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: &str, url: &str) {
        self.windows.write().await.push(ClientWindow {
            id: id.to_string(),
            url: url.to_string(),
            focused: false,
        });
    }

    pub async fn remove(&self, id: &str) {
        self.windows.write().await.retain(|w| w.id != id);
    }
}

#[async_trait]
impl ClientWindows for MemoryClients {
    async fn windows(&self) -> Vec<ClientWindow> {
        self.windows.read().await.clone()
    }

    async fn focus_and_navigate(&self, id: &str, url: &str) -> Result<()> {
        let mut windows = self.windows.write().await;
        if !windows.iter().any(|w| w.id == id) {
            anyhow::bail!("No client window with id {}", id);
        }
        for window in windows.iter_mut() {
            window.focused = window.id == id;
            if window.focused {
                window.url = url.to_string();
            }
        }
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        let mut windows = self.windows.write().await;
        for window in windows.iter_mut() {
            window.focused = false;
        }
        let id = format!("window-{}", windows.len() + 1);
        windows.push(ClientWindow {
            id,
            url: url.to_string(),
            focused: true,
        });
        Ok(())
    }
}
