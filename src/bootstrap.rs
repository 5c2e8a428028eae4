//! Wiring: database, session backend, module registry and the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use libris_authz::StaffPolicy;
use libris_kernel::{
    settings::{SessionBackend, Settings},
    InitCtx, ModuleRegistry,
};

use crate::modules;
use crate::session::{MemorySessionStore, SessionStore, SqliteSessionStore};
use crate::state::AppState;

/// Everything a running application needs, with migrations applied
pub struct Application {
    pub state: AppState,
    pub registry: ModuleRegistry,
}

/// Open the database, register every module and bring the schema up to date
pub async fn prepare(settings: &Settings) -> anyhow::Result<Application> {
    let pool = libris_db::connect(&settings.database).await?;

    let sessions: Arc<dyn SessionStore> = match settings.session.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::Database => Arc::new(SqliteSessionStore::new(pool.clone())),
    };
    let state = AppState::new(pool.clone(), sessions, settings);

    let mut registry = ModuleRegistry::new();
    registry.register_core(libris_db::create_module(pool.clone()));
    registry.register_core(libris_authz::create_module(StaffPolicy::from_settings(
        &settings.auth,
    )));
    modules::register_all(&mut registry, &state);

    let applied = libris_db::migrate(&pool, &registry.collect_migrations())
        .await
        .context("failed to apply migrations")?;
    tracing::info!(
        applied,
        core = registry.core_module_count(),
        custom = registry.custom_module_count(),
        "modules registered"
    );

    Ok(Application { state, registry })
}

/// Apply pending migrations and return how many ran
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let pool = libris_db::connect(&settings.database).await?;

    let mut registry = ModuleRegistry::new();
    let state = AppState::new(
        pool.clone(),
        Arc::new(MemorySessionStore::new()),
        settings,
    );
    modules::register_all(&mut registry, &state);

    let applied = libris_db::migrate(&pool, &registry.collect_migrations()).await?;
    pool.close().await;
    Ok(applied)
}

/// Run the full lifecycle: init, start, serve until shutdown, stop
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let Application { registry, .. } = prepare(settings).await?;
    let ctx = InitCtx { settings };

    registry.init_core_modules(&ctx).await?;
    registry.init_custom_modules(&ctx).await?;
    registry.start_core_modules(&ctx).await?;
    registry.start_custom_modules(&ctx).await?;

    let served = libris_http::start_server(&registry, settings).await;

    registry.stop_custom_modules().await?;
    registry.stop_core_modules().await?;
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory() -> Settings {
        let mut settings = Settings::default();
        settings.database.url = "sqlite::memory:".to_string();
        settings
    }

    #[tokio::test]
    async fn prepare_registers_modules_and_migrates() {
        let settings = in_memory();
        let app = prepare(&settings).await.unwrap();

        assert_eq!(app.registry.core_module_count(), 2);
        for name in ["catalog", "selection", "loans"] {
            assert!(app.registry.get_module(name).is_some(), "{} missing", name);
        }

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('genre', 'book', 'reader', 'loan', 'loan_item', 'visitor_session')",
        )
        .fetch_one(&app.state.db)
        .await
        .unwrap();
        assert_eq!(tables, 6);

        let ctx = InitCtx {
            settings: &settings,
        };
        app.registry.init_core_modules(&ctx).await.unwrap();
        app.registry.init_custom_modules(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn migrate_reports_applied_count() {
        assert_eq!(migrate(&in_memory()).await.unwrap(), 3);
    }
}
