// File: architect-broker/src/store.rs
// Purpose: Durable queue of mutating requests awaiting replay

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Result;
use crate::request::BrokerRequest;

/// Headers recomputed by the transport on replay
const UNREPLAYED_HEADERS: &[&str] = &["host", "content-length", "connection"];

/// A mutating request that failed while offline
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingAction {
    pub id: i64,
    pub url: String,
    pub method: String,
    /// In request order; repeated names keep every value
    pub headers: Vec<(String, String)>,
    #[serde(serialize_with = "serialize_body")]
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
}

fn serialize_body<S: Serializer>(body: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

impl PendingAction {
    /// Path component of the target URL
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let headers: String = row.try_get("headers")?;

        Ok(Self {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            method: row.try_get("method")?,
            headers: serde_json::from_str(&headers)?,
            body: row.try_get("body")?,
            timestamp: row.try_get("timestamp")?,
            synced: row.try_get("synced")?,
        })
    }
}

/// Snapshot of a request, ready to be queued
#[derive(Debug, Clone)]
pub struct NewPendingAction {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl NewPendingAction {
    pub fn from_request(request: &BrokerRequest) -> Self {
        let headers = request
            .headers
            .iter()
            .filter(|(name, _)| !UNREPLAYED_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();

        Self {
            url: request.url.to_string(),
            method: request.method.as_str().to_string(),
            headers,
            body: request.body.to_vec(),
        }
    }
}

/// File path of a `sqlite:` URL, without query parameters
fn database_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next()?;
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Queue counts, for status output
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct QueueCounts {
    pub unsynced: i64,
    pub synced: i64,
}

/// SQLite-backed store of pending actions
///
/// Every operation is a single statement; the broker holds no locks across
/// operations.
#[derive(Clone)]
pub struct ActionStore {
    pool: SqlitePool,
}

impl ActionStore {
    /// Open (creating if needed) the database and ensure the schema exists
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let pool = if in_memory {
            // Each connection to :memory: is its own database; keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            let parent = database_path(database_url)
                .and_then(|path| path.parent().map(Path::to_path_buf))
                .filter(|parent| !parent.as_os_str().is_empty());
            if let Some(parent) = parent {
                std::fs::create_dir_all(&parent).map_err(sqlx::Error::Io)?;
            }
            SqlitePoolOptions::new().connect_with(options).await?
        };

        Self::from_pool(pool).await
    }

    /// Fresh private in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::open("sqlite::memory:").await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Idempotent schema creation
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                timestamp TEXT NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pending_synced ON pending_actions(synced)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_timestamp ON pending_actions(timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a new unsynced action
    pub async fn enqueue(&self, action: NewPendingAction) -> Result<PendingAction> {
        let headers = serde_json::to_string(&action.headers)?;

        let row = sqlx::query(
            r#"
            INSERT INTO pending_actions (url, method, headers, body, timestamp, synced)
            VALUES (?, ?, ?, ?, ?, 0)
            RETURNING id, url, method, headers, body, timestamp, synced
            "#,
        )
        .bind(&action.url)
        .bind(&action.method)
        .bind(headers)
        .bind(&action.body)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        let queued = PendingAction::from_row(&row)?;
        tracing::info!(id = queued.id, method = %queued.method, url = %queued.url, "Queued offline action");
        Ok(queued)
    }

    /// Every action still waiting for a successful replay, oldest first
    pub async fn unsynced(&self) -> Result<Vec<PendingAction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, method, headers, body, timestamp, synced
            FROM pending_actions
            WHERE synced = 0
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(PendingAction::from_row).collect()
    }

    /// Every action, synced ones included
    pub async fn all(&self) -> Result<Vec<PendingAction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, method, headers, body, timestamp, synced
            FROM pending_actions
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(PendingAction::from_row).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<PendingAction>> {
        let row = sqlx::query(
            r#"
            SELECT id, url, method, headers, body, timestamp, synced
            FROM pending_actions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(PendingAction::from_row).transpose()
    }

    /// Flip the synced flag. The record is kept.
    pub async fn mark_synced(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE pending_actions SET synced = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END), 0) AS unsynced,
                COALESCE(SUM(CASE WHEN synced = 1 THEN 1 ELSE 0 END), 0) AS synced
            FROM pending_actions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueCounts {
            unsynced: row.try_get("unsynced")?,
            synced: row.try_get("synced")?,
        })
    }

    /// Close the underlying pool; later operations fail with `BrokerError::Store`
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
