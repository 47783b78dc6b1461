//! Session store backends

use super::{SessionError, SessionRecord};
use crate::db::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Persistent session storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a record by id, expired or not; `None` when unknown
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Insert or replace a record
    async fn save(&self, record: &SessionRecord) -> Result<(), SessionError>;

    async fn destroy(&self, id: &str) -> Result<(), SessionError>;

    /// Remove every expired record, returning how many went
    async fn cleanup_expired(&self) -> Result<u64, SessionError>;
}

/// Sessions kept in the `sessions` table of the storefront database
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the sessions table and its expiry index if missing
    pub async fn initialize(&self) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS sessions (
                    sid TEXT PRIMARY KEY,
                    data JSONB NOT NULL DEFAULT '{}'::jsonb,
                    expires_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions (expires_at);",
            )
            .await?;
        info!("✅ Session store ready");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT data, expires_at FROM sessions WHERE sid = $1",
                &[&id],
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: Value = row.get(0);
        let expires_at: DateTime<Utc> = row.get(1);
        match data {
            Value::Object(data) => Ok(Some(SessionRecord {
                id: id.to_string(),
                data,
                expires_at,
            })),
            other => Err(SessionError::Corrupt {
                id: id.to_string(),
                reason: format!("expected an object, found {}", other),
            }),
        }
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let client = self.pool.get().await?;
        let data = Value::Object(record.data.clone());
        client
            .execute(
                "INSERT INTO sessions (sid, data, expires_at) VALUES ($1, $2, $3)
                 ON CONFLICT (sid) DO UPDATE SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at",
                &[&record.id, &data, &record.expires_at],
            )
            .await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM sessions WHERE sid = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64, SessionError> {
        let client = self.pool.get().await?;
        let removed = client
            .execute("DELETE FROM sessions WHERE expires_at <= now()", &[])
            .await?;
        Ok(removed)
    }
}

/// In-process session store used by tests
#[cfg(test)]
#[derive(Default)]
pub struct MemorySessionStore {
    records: tokio::sync::RwLock<std::collections::HashMap<String, SessionRecord>>,
    writes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls served so far
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64, SessionError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

/// Periodically purge expired sessions in the background
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!("Purged {} expired sessions", removed),
                Err(e) => warn!("Session cleanup failed: {}", e),
            }
        }
    })
}
