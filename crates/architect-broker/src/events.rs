// File: architect-broker/src/events.rs
// Purpose: Event dispatch for the broker registration

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::broker::PeriodicReport;
use crate::config::BrokerConfig;
use crate::error::Result;
use crate::notify::{ClickOutcome, Notification};
use crate::registration::{Activation, Registration};
use crate::request::{BrokerRequest, BrokerResponse};
use crate::sync::{PeriodicTag, SyncReport, SyncTag};

/// Messages a page can post to the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate the waiting version now
    SkipWaiting,
}

/// Every event the host platform can deliver
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Install a new version (activates right away with `skip_waiting`)
    Install(Box<BrokerConfig>),
    /// Activate the waiting version
    Activate,
    Fetch(BrokerRequest),
    Sync(String),
    PeriodicSync(String),
    Push(Bytes),
    NotificationClick {
        action: Option<String>,
        url: Option<String>,
    },
    Message(ClientMessage),
}

impl BrokerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
            Self::Sync(_) => "sync",
            Self::PeriodicSync(_) => "periodicsync",
            Self::Push(_) => "push",
            Self::NotificationClick { .. } => "notificationclick",
            Self::Message(_) => "message",
        }
    }
}

/// What handling an event produced
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed { generation: String },
    Activated(Option<Activation>),
    Response(BrokerResponse),
    Synced(SyncReport),
    Periodic(PeriodicReport),
    Notified(Notification),
    Clicked(ClickOutcome),
    /// Not handled: unknown tag, or no active version
    Ignored(String),
}

impl Registration {
    /// Handle one event to completion.
    ///
    /// Errors are limited to install failures, durable store failures and
    /// notification surface failures; network trouble is absorbed.
    pub async fn dispatch(&self, event: BrokerEvent) -> Result<EventOutcome> {
        let kind = event.kind();
        tracing::debug!("Dispatching {} event", kind);

        match event {
            BrokerEvent::Install(config) => {
                let broker = self.register(*config).await?;
                Ok(EventOutcome::Installed {
                    generation: broker.generation().label.clone(),
                })
            }
            BrokerEvent::Activate | BrokerEvent::Message(ClientMessage::SkipWaiting) => {
                Ok(EventOutcome::Activated(self.skip_waiting().await?))
            }
            BrokerEvent::Fetch(request) => Ok(EventOutcome::Response(self.handle_fetch(request).await?)),
            BrokerEvent::Sync(tag) => {
                let Some(broker) = self.active().await else {
                    return Ok(no_active(kind));
                };
                match tag.parse::<SyncTag>() {
                    Ok(tag) => Ok(EventOutcome::Synced(broker.sync(tag).await)),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Ok(EventOutcome::Ignored(e.to_string()))
                    }
                }
            }
            BrokerEvent::PeriodicSync(tag) => {
                let Some(broker) = self.active().await else {
                    return Ok(no_active(kind));
                };
                match tag.parse::<PeriodicTag>() {
                    Ok(tag) => Ok(EventOutcome::Periodic(broker.periodic_sync(tag).await)),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Ok(EventOutcome::Ignored(e.to_string()))
                    }
                }
            }
            BrokerEvent::Push(data) => {
                let Some(broker) = self.active().await else {
                    return Ok(no_active(kind));
                };
                Ok(EventOutcome::Notified(broker.push(&data).await?))
            }
            BrokerEvent::NotificationClick { action, url } => {
                let Some(broker) = self.active().await else {
                    return Ok(no_active(kind));
                };
                let outcome = broker
                    .notification_click(action.as_deref(), url.as_deref())
                    .await?;
                Ok(EventOutcome::Clicked(outcome))
            }
        }
    }
}

fn no_active(kind: &str) -> EventOutcome {
    tracing::debug!("No active broker for {} event", kind);
    EventOutcome::Ignored(format!("{} event with no active broker", kind))
}
