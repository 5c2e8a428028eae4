//! Genres and books.

pub mod models;
mod routes;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::get, Router};
use libris_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use crate::state::AppState;

pub struct CatalogModule {
    state: AppState,
}

impl CatalogModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for CatalogModule {
    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book")
            .fetch_one(&self.state.db)
            .await?;
        tracing::info!(module = self.name(), books, "catalog module initialized");
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health_check))
            .route(
                "/genres",
                get(routes::list_genres).post(routes::create_genre),
            )
            .route("/books", get(routes::list_books).post(routes::create_book))
            .route(
                "/books/{slug}",
                get(routes::book_detail).delete(routes::delete_book),
            )
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "description": "Error",
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
        });
        let staff = json!([{"staffToken": []}]);

        Some(json!({
            "paths": {
                "/genres": {
                    "get": {
                        "summary": "List genres",
                        "tags": ["Catalog"],
                        "responses": {
                            "200": {
                                "description": "Genres ordered by name",
                                "content": {"application/json": {"schema": {
                                    "type": "array",
                                    "items": {"$ref": "#/components/schemas/Genre"}
                                }}}
                            }
                        }
                    },
                    "post": {
                        "summary": "Create a genre",
                        "tags": ["Catalog"],
                        "security": staff,
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/CreateGenre"}}}
                        },
                        "responses": {
                            "201": {"description": "Genre created"},
                            "401": error,
                            "403": error,
                            "409": error,
                            "422": error
                        }
                    }
                },
                "/books": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Catalog"],
                        "parameters": [{
                            "name": "genre",
                            "in": "query",
                            "required": false,
                            "description": "Restrict to one genre slug",
                            "schema": {"type": "string"}
                        }],
                        "responses": {
                            "200": {
                                "description": "Books ordered by title",
                                "content": {"application/json": {"schema": {
                                    "type": "array",
                                    "items": {"$ref": "#/components/schemas/Book"}
                                }}}
                            },
                            "404": error
                        }
                    },
                    "post": {
                        "summary": "Add a book to the catalog",
                        "tags": ["Catalog"],
                        "security": staff,
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/CreateBook"}}}
                        },
                        "responses": {
                            "201": {"description": "Book created"},
                            "401": error,
                            "403": error,
                            "404": error,
                            "409": error,
                            "422": error
                        }
                    }
                },
                "/books/{slug}": {
                    "parameters": [{
                        "name": "slug",
                        "in": "path",
                        "required": true,
                        "schema": {"type": "string"}
                    }],
                    "get": {
                        "summary": "Book detail",
                        "tags": ["Catalog"],
                        "responses": {
                            "200": {
                                "description": "The book",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Book"}}}
                            },
                            "404": error
                        }
                    },
                    "delete": {
                        "summary": "Delete a book not on an outstanding loan",
                        "tags": ["Catalog"],
                        "security": staff,
                        "responses": {
                            "200": {"description": "Book deleted"},
                            "401": error,
                            "403": error,
                            "404": error,
                            "409": error
                        }
                    }
                },
                "/health": {
                    "get": {
                        "summary": "Catalog health check",
                        "tags": ["Catalog"],
                        "responses": {"200": {"description": "OK"}}
                    }
                }
            },
            "components": {
                "schemas": {
                    "Genre": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer"},
                            "name": {"type": "string"},
                            "slug": {"type": "string"}
                        },
                        "required": ["id", "name", "slug"]
                    },
                    "CreateGenre": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "slug": {"type": "string", "description": "Derived from the name when omitted"}
                        },
                        "required": ["name"]
                    },
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer"},
                            "title": {"type": "string"},
                            "author": {"type": "string"},
                            "genre_id": {"type": "integer"},
                            "publication_year": {"type": "integer"},
                            "available": {"type": "boolean"},
                            "slug": {"type": "string"}
                        },
                        "required": ["id", "title", "author", "genre_id", "publication_year", "available", "slug"]
                    },
                    "CreateBook": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "author": {"type": "string"},
                            "genre_id": {"type": "integer"},
                            "publication_year": {"type": "integer", "minimum": 1000, "maximum": 2100},
                            "available": {"type": "boolean", "default": true},
                            "slug": {"type": "string", "description": "Derived from the title when omitted"}
                        },
                        "required": ["title", "author", "genre_id", "publication_year"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![store::CATALOG_MIGRATION]
    }
}

pub fn create_module(state: AppState) -> Arc<dyn Module> {
    Arc::new(CatalogModule::new(state))
}
