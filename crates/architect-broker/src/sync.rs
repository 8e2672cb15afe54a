// File: architect-broker/src/sync.rs
// Purpose: Background replay of queued actions and periodic sync tags

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::policy::{api_relative, segment_prefix};
use crate::store::{ActionStore, PendingAction};
use crate::upstream::{replay_request, Upstream};

/// Background sync tags. Each selects a subset of queued actions by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
    UserData,
    ExerciseProgress,
    All,
}

impl SyncTag {
    pub const ALL_TAGS: [SyncTag; 3] = [Self::UserData, Self::ExerciseProgress, Self::All];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserData => "sync-user-data",
            Self::ExerciseProgress => "sync-exercise-progress",
            Self::All => "sync-all",
        }
    }

    /// Path segment below the API prefix selected by the tag; `None`
    /// selects everything
    pub fn path_pattern(self) -> Option<&'static str> {
        match self {
            Self::UserData => Some("user"),
            Self::ExerciseProgress => Some("exercises"),
            Self::All => None,
        }
    }

    pub fn matches(self, api_prefix: &str, action: &PendingAction) -> bool {
        let Some(pattern) = self.path_pattern() else {
            return true;
        };
        let path = action.path();
        api_relative(api_prefix, &path).is_some_and(|rest| segment_prefix(rest, pattern))
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag string not known to the broker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sync tag: {0}")]
pub struct UnknownTag(pub String);

impl FromStr for SyncTag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_TAGS
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// Periodic sync tags, scheduled by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodicTag {
    CheckReminders,
    UpdateContent,
}

impl PeriodicTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckReminders => "check-reminders",
            Self::UpdateContent => "update-content",
        }
    }
}

impl fmt::Display for PeriodicTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodicTag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-reminders" => Ok(Self::CheckReminders),
            "update-content" => Ok(Self::UpdateContent),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

/// Result of one sync batch
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub tag: String,
    /// Matching unsynced actions in the batch
    pub attempted: usize,
    /// Actions confirmed by the network and marked synced
    pub synced: usize,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.synced
    }
}

/// Replay every unsynced action selected by `tag`, concurrently.
///
/// Never fails: per-action errors leave the record unsynced for the next
/// trigger, and an unreadable queue yields an empty report.
pub async fn replay_pending(
    store: &ActionStore,
    upstream: &dyn Upstream,
    tag: SyncTag,
    api_prefix: &str,
) -> SyncReport {
    let pending = match store.unsynced().await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!("Sync {}: failed to read pending actions: {}", tag, e);
            return SyncReport {
                tag: tag.to_string(),
                attempted: 0,
                synced: 0,
            };
        }
    };

    let batch: Vec<PendingAction> = pending
        .into_iter()
        .filter(|a| tag.matches(api_prefix, a))
        .collect();
    tracing::debug!("Sync {}: replaying {} actions", tag, batch.len());

    let results = join_all(batch.iter().map(|action| replay_one(store, upstream, action))).await;
    let synced = results.into_iter().filter(|ok| *ok).count();

    tracing::info!("Sync {}: {}/{} actions synced", tag, synced, batch.len());

    SyncReport {
        tag: tag.to_string(),
        attempted: batch.len(),
        synced,
    }
}

async fn replay_one(store: &ActionStore, upstream: &dyn Upstream, action: &PendingAction) -> bool {
    let request = match replay_request(action) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Action {} cannot be replayed: {}", action.id, e);
            return false;
        }
    };

    match upstream.fetch(&request).await {
        Ok(response) if response.is_ok() => match store.mark_synced(action.id).await {
            Ok(_) => true,
            Err(e) => {
                // Replayed but not recorded; it will be sent again next time
                tracing::error!("Action {} replayed but not marked synced: {}", action.id, e);
                false
            }
        },
        Ok(response) => {
            tracing::debug!("Action {} rejected with {}", action.id, response.status);
            false
        }
        Err(e) => {
            tracing::debug!("Action {} still offline: {}", action.id, e);
            false
        }
    }
}

/// One entry of the reminders-due endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default, alias = "body")]
    pub message: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

/// The reminder to notify about: smallest `due_at`; entries without one
/// rank after dated entries, keeping their order
pub fn earliest_reminder(reminders: &[Reminder]) -> Option<&Reminder> {
    reminders
        .iter()
        .enumerate()
        .min_by_key(|(index, r)| (r.due_at.is_none(), r.due_at, *index))
        .map(|(_, r)| r)
}
