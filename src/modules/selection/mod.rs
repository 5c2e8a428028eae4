//! The visitor's loan selection and its session-backed endpoints.

mod aggregate;
mod routes;
mod storage;

pub use aggregate::{
    parse_quantity, Selection, SelectionEntryRecord, SelectionError, SelectionItem,
    SelectionRecord,
};
pub use routes::SelectionView;
pub use storage::{discard_selection, load_selection, save_selection};

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    routing::{get, post},
    Router,
};
use libris_kernel::{settings::SessionBackend, InitCtx, Migration, Module};
use serde_json::json;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::session::{spawn_sweeper, SESSION_MIGRATION};
use crate::state::AppState;

pub struct SelectionModule {
    state: AppState,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SelectionModule {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            sweeper: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Module for SelectionModule {
    fn name(&self) -> &'static str {
        "selection"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if ctx.settings.session.backend == SessionBackend::Memory {
            tracing::warn!(
                module = self.name(),
                "selections are kept in memory and are lost on restart"
            );
        }
        tracing::info!(
            module = self.name(),
            slot = %self.state.selection_slot,
            "selection module initialized"
        );
        Ok(())
    }

    /// Selections of visitors idle longer than `session.idle_ttl_secs` are
    /// purged in the background
    async fn start(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let session = &ctx.settings.session;
        let handle = spawn_sweeper(
            self.state.sessions.clone(),
            session.idle_ttl(),
            session.sweep_interval(),
        );
        if let Some(previous) = self.sweeper.lock().await.replace(handle) {
            previous.abort();
        }
        tracing::info!(
            module = self.name(),
            idle_ttl_secs = session.idle_ttl_secs,
            "session sweeper started"
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.abort();
        }
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(routes::selection_detail))
            .route("/health", get(routes::health_check))
            .route("/add/{book_slug}", post(routes::add_book))
            .route("/remove/{book_id}", post(routes::remove_book))
            .route("/clear", post(routes::clear_selection))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "description": "Error",
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
        });
        let message = json!({
            "description": "Outcome message and the new total",
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/SelectionMessage"}}}
        });

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "Current selection",
                        "tags": ["Selection"],
                        "responses": {
                            "200": {
                                "description": "Entries, total items and distinct titles",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/SelectionView"}}}
                            },
                            "400": error
                        }
                    }
                },
                "/add/{book_slug}": {
                    "post": {
                        "summary": "Add copies of a book",
                        "tags": ["Selection"],
                        "parameters": [
                            {"name": "book_slug", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "quantity", "in": "query", "required": false, "schema": {"type": "integer", "minimum": 1, "default": 1}}
                        ],
                        "responses": {"200": message, "400": error, "404": error, "409": error, "422": error}
                    }
                },
                "/remove/{book_id}": {
                    "post": {
                        "summary": "Remove a book",
                        "tags": ["Selection"],
                        "parameters": [
                            {"name": "book_id", "in": "path", "required": true, "schema": {"type": "integer"}}
                        ],
                        "responses": {"200": message, "400": error}
                    }
                },
                "/clear": {
                    "post": {
                        "summary": "Empty the selection",
                        "tags": ["Selection"],
                        "responses": {"200": message}
                    }
                },
                "/health": {
                    "get": {
                        "summary": "Selection health check",
                        "tags": ["Selection"],
                        "responses": {"200": {"description": "OK"}}
                    }
                }
            },
            "components": {
                "schemas": {
                    "SelectionItem": {
                        "type": "object",
                        "properties": {
                            "book_id": {"type": "integer"},
                            "title": {"type": "string"},
                            "quantity": {"type": "integer", "minimum": 1}
                        },
                        "required": ["book_id", "title", "quantity"]
                    },
                    "SelectionView": {
                        "type": "object",
                        "properties": {
                            "items": {"type": "array", "items": {"$ref": "#/components/schemas/SelectionItem"}},
                            "total_items": {"type": "integer"},
                            "distinct_titles": {"type": "integer"}
                        },
                        "required": ["items", "total_items", "distinct_titles"]
                    },
                    "SelectionMessage": {
                        "type": "object",
                        "properties": {
                            "message": {"type": "string"},
                            "total_items": {"type": "integer"}
                        },
                        "required": ["message", "total_items"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![SESSION_MIGRATION]
    }
}

pub fn create_module(state: AppState) -> Arc<dyn Module> {
    Arc::new(SelectionModule::new(state))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use libris_http::VisitorId;
    use libris_kernel::settings::Settings;

    use super::*;
    use crate::session::MemorySessionStore;

    #[tokio::test]
    async fn start_sweeps_idle_selections_and_stop_ends_the_sweeper() {
        let mut settings = Settings::default();
        settings.session.idle_ttl_secs = 0;
        settings.session.sweep_interval_secs = 1;
        let pool = libris_db::connect_in_memory().await.unwrap();
        let state = AppState::new(pool, Arc::new(MemorySessionStore::new()), &settings);
        let visitor = VisitorId::generate();
        save_selection(&state, &visitor, &Selection::new()).await.unwrap();

        let module = SelectionModule::new(state.clone());
        module.start(&InitCtx { settings: &settings }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            state.sessions.load(&visitor, &state.selection_slot).await.unwrap(),
            None
        );

        module.stop().await.unwrap();
        assert!(module.sweeper.lock().await.is_none());
    }
}

