//! SQLite connection pool and migration runner.
//!
//! Modules contribute [`Migration`]s through the kernel registry; this crate
//! applies the ones not yet recorded in `schema_migration`, each inside its own
//! transaction.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use libris_kernel::settings::DatabaseSettings;
use libris_kernel::{Migration, Module};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

const MIGRATION_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migration (
        module     TEXT NOT NULL,
        id         TEXT NOT NULL,
        applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (module, id)
    )
"#;

/// Open a pool for the configured database.
///
/// Foreign keys are enforced on every connection. An in-memory database lives
/// as long as its single pinned connection, so the pool never recycles it.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(&settings.url)
        .with_context(|| format!("invalid database url '{}'", settings.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(settings.busy_timeout_secs));

    let pool_options = if settings.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options = options.journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(settings.busy_timeout_secs))
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database '{}'", settings.url))?;

    tracing::info!(
        target: "libris-db",
        url = %settings.url,
        in_memory = settings.is_in_memory(),
        "database pool ready"
    );
    Ok(pool)
}

/// Fresh in-memory database, used by tests across the workspace.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    connect(&DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        ..DatabaseSettings::default()
    })
    .await
}

/// Open a transaction that holds the write lock from its first statement.
///
/// A deferred transaction that reads and then writes cannot wait for another
/// writer under WAL; it fails with `SQLITE_BUSY` on upgrade. `BEGIN IMMEDIATE`
/// waits on `busy_timeout` instead.
pub async fn begin_write(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Apply pending migrations in the given order. Returns how many ran.
pub async fn migrate(pool: &SqlitePool, migrations: &[(String, Migration)]) -> anyhow::Result<usize> {
    sqlx::raw_sql(MIGRATION_TABLE)
        .execute(pool)
        .await
        .context("failed to create schema_migration table")?;

    let mut applied = 0;
    for (module, migration) in migrations {
        let already: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM schema_migration WHERE module = ? AND id = ?",
        )
        .bind(module)
        .bind(migration.id)
        .fetch_one(pool)
        .await?;
        if already > 0 {
            continue;
        }

        let mut tx = begin_write(pool).await?;
        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {}/{} failed", module, migration.id))?;
        sqlx::query("INSERT INTO schema_migration (module, id) VALUES (?, ?)")
            .bind(module)
            .bind(migration.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(target: "libris-db", module = %module, id = migration.id, "migration applied");
        applied += 1;
    }

    Ok(applied)
}

/// Core module owning the pool's shutdown.
pub struct DbModule {
    pool: SqlitePool,
}

impl DbModule {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Module for DbModule {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn init(&self, _ctx: &libris_kernel::InitCtx<'_>) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database did not answer a ping")?;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        tracing::info!(target: "libris-db", "database pool closed");
        Ok(())
    }
}

pub fn create_module(pool: SqlitePool) -> Arc<dyn Module> {
    Arc::new(DbModule::new(pool))
}
