//! Per-visitor session storage.
//!
//! A session is a set of named slots holding JSON values. Handlers never touch
//! ambient state: they load what they need through a [`SessionStore`] and save
//! it back explicitly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use libris_http::VisitorId;
use libris_kernel::Migration;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Value stored under `slot`, or `None` when the slot was never written
    async fn load(&self, visitor: &VisitorId, slot: &str) -> anyhow::Result<Option<Value>>;

    async fn save(&self, visitor: &VisitorId, slot: &str, value: Value) -> anyhow::Result<()>;

    async fn remove(&self, visitor: &VisitorId, slot: &str) -> anyhow::Result<()>;

    /// Drop every session not written within `idle`; returns how many went
    async fn purge_idle(&self, idle: Duration) -> anyhow::Result<u64>;
}

#[derive(Debug)]
struct MemorySession {
    slots: HashMap<String, Value>,
    written: Instant,
}

/// Process-local store; sessions vanish on restart
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<VisitorId, MemorySession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, visitor: &VisitorId, slot: &str) -> anyhow::Result<Option<Value>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(visitor)
            .and_then(|session| session.slots.get(slot))
            .cloned())
    }

    async fn save(&self, visitor: &VisitorId, slot: &str, value: Value) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(visitor.clone())
            .or_insert_with(|| MemorySession {
                slots: HashMap::new(),
                written: Instant::now(),
            });
        session.slots.insert(slot.to_string(), value);
        session.written = Instant::now();
        Ok(())
    }

    async fn remove(&self, visitor: &VisitorId, slot: &str) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(visitor) {
            session.slots.remove(slot);
            if session.slots.is_empty() {
                sessions.remove(visitor);
            }
        }
        Ok(())
    }

    async fn purge_idle(&self, idle: Duration) -> anyhow::Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.written.elapsed() < idle);
        Ok((before - sessions.len()) as u64)
    }
}

/// Sessions kept in the application database
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) const SESSION_MIGRATION: Migration = Migration {
    id: "001_visitor_session",
    up: r#"
        CREATE TABLE visitor_session (
            visitor_id TEXT NOT NULL,
            slot       TEXT NOT NULL,
            payload    TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (visitor_id, slot)
        );
    "#,
};

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, visitor: &VisitorId, slot: &str) -> anyhow::Result<Option<Value>> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM visitor_session WHERE visitor_id = ? AND slot = ?",
        )
        .bind(visitor.to_string())
        .bind(slot)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read session slot")?;

        payload
            .map(|raw| serde_json::from_str(&raw).context("session slot is not valid JSON"))
            .transpose()
    }

    async fn save(&self, visitor: &VisitorId, slot: &str, value: Value) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO visitor_session (visitor_id, slot, payload, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT (visitor_id, slot)
            DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(visitor.to_string())
        .bind(slot)
        .bind(value.to_string())
        .execute(&self.pool)
        .await
        .context("failed to write session slot")?;
        Ok(())
    }

    async fn remove(&self, visitor: &VisitorId, slot: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM visitor_session WHERE visitor_id = ? AND slot = ?")
            .bind(visitor.to_string())
            .bind(slot)
            .execute(&self.pool)
            .await
            .context("failed to delete session slot")?;
        Ok(())
    }

    async fn purge_idle(&self, idle: Duration) -> anyhow::Result<u64> {
        let purged = sqlx::query(
            "DELETE FROM visitor_session WHERE updated_at < datetime('now', ?)",
        )
        .bind(format!("-{} seconds", idle.as_secs()))
        .execute(&self.pool)
        .await
        .context("failed to purge idle sessions")?
        .rows_affected();
        Ok(purged)
    }
}

/// Purge idle sessions every `every` until the task is aborted
pub fn spawn_sweeper(
    store: Arc<dyn SessionStore>,
    idle: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            match store.purge_idle(idle).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "idle sessions purged"),
                Err(error) => tracing::warn!(error = %error, "session sweep failed"),
            }
        }
    })
}
