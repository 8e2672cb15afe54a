// File: architect-broker/src/registration.rs
// Purpose: Holds the waiting and active broker versions

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::broker::{pass_through, Broker, Host};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::request::{BrokerRequest, BrokerResponse};

/// Result of activating the waiting version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub generation: String,
    pub purged: Vec<String>,
}

/// Owner of every broker version attached to one host.
///
/// At most one version is active (serving requests) and at most one is
/// waiting. Activation swaps the waiting version in and supersedes the old
/// one; requests are routed to whichever version is active at the time.
pub struct Registration {
    host: Host,
    waiting: RwLock<Option<Arc<Broker>>>,
    active: RwLock<Option<Arc<Broker>>>,
}

impl Registration {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            waiting: RwLock::new(None),
            active: RwLock::new(None),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub async fn active(&self) -> Option<Arc<Broker>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<Broker>> {
        self.waiting.read().await.clone()
    }

    /// Install a new version from `config`.
    ///
    /// On success the version waits, or activates immediately when
    /// `lifecycle.skip_waiting` is set. On failure the active version keeps
    /// serving. Labels of the active and waiting versions are refused.
    pub async fn register(&self, config: BrokerConfig) -> Result<Arc<Broker>> {
        let label = &config.cache.generation;
        let current = [
            (self.active().await, "active"),
            (self.waiting().await, "waiting"),
        ];
        for (broker, role) in current {
            if broker.is_some_and(|broker| &broker.generation().label == label) {
                return Err(BrokerError::Lifecycle(format!(
                    "generation {} is already {}",
                    label, role
                )));
            }
        }

        let skip_waiting = config.lifecycle.skip_waiting;
        let broker = Arc::new(Broker::new(config, self.host.clone())?);
        broker.install().await?;

        let replaced = self.waiting.write().await.replace(broker.clone());
        if let Some(replaced) = replaced {
            tracing::info!(
                "Waiting generation {} replaced before activation",
                replaced.generation().label
            );
            replaced.discard().await;
        }

        if skip_waiting {
            self.skip_waiting().await?;
        }

        Ok(broker)
    }

    /// Activate the waiting version, if any, and claim all clients for it
    pub async fn skip_waiting(&self) -> Result<Option<Activation>> {
        let Some(next) = self.waiting.write().await.take() else {
            return Ok(None);
        };

        let purged = match next.activate().await {
            Ok(purged) => purged,
            Err(e) => {
                // Keep it waiting so a later attempt can retry
                *self.waiting.write().await = Some(next);
                return Err(e);
            }
        };

        let previous = self.active.write().await.replace(next.clone());
        if let Some(previous) = previous {
            previous.supersede().await;
        }

        Ok(Some(Activation {
            generation: next.generation().label.clone(),
            purged,
        }))
    }

    /// Route a request to the active version; with none, the network answers
    pub async fn handle_fetch(&self, request: BrokerRequest) -> Result<BrokerResponse> {
        match self.active().await {
            Some(broker) => broker.handle_fetch(request).await,
            None => Ok(pass_through(self.host.upstream.as_ref(), &request).await),
        }
    }
}
