//! Loans: checkout of a selection, returns and the loan ledger.

pub mod ledger;
pub mod models;
mod routes;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    routing::{get, post},
    Router,
};
use libris_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use crate::state::AppState;

pub struct LoansModule {
    state: AppState,
}

impl LoansModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for LoansModule {
    fn name(&self) -> &'static str {
        "loans"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let outstanding: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loan WHERE status <> ?")
            .bind(models::LoanStatus::Returned)
            .fetch_one(&self.state.db)
            .await?;
        tracing::info!(module = self.name(), outstanding, "loans module initialized");
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(routes::list_loans).post(routes::create_loan))
            .route("/health", get(routes::health_check))
            .route("/{loan_id}", get(routes::loan_detail))
            .route("/{loan_id}/return", post(routes::return_loan))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "description": "Error",
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
        });
        let staff = json!([{"staffToken": []}]);
        let loan_id = json!({"name": "loan_id", "in": "path", "required": true, "schema": {"type": "integer"}});

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "All loans, newest first",
                        "tags": ["Loans"],
                        "security": staff,
                        "responses": {
                            "200": {
                                "description": "Loans with reader, items and totals",
                                "content": {"application/json": {"schema": {
                                    "type": "array",
                                    "items": {"$ref": "#/components/schemas/LoanSummary"}
                                }}}
                            },
                            "401": error,
                            "403": error
                        }
                    },
                    "post": {
                        "summary": "Create a loan from the visitor's selection",
                        "tags": ["Loans"],
                        "security": staff,
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ReaderDetails"}}}
                        },
                        "responses": {
                            "201": {
                                "description": "Loan created; `Location` points at the loan",
                                "headers": {"Location": {"schema": {"type": "string"}}}
                            },
                            "400": error,
                            "401": error,
                            "403": error,
                            "404": error,
                            "409": error,
                            "422": error
                        }
                    }
                },
                "/{loan_id}": {
                    "get": {
                        "summary": "Loan detail",
                        "tags": ["Loans"],
                        "parameters": [loan_id],
                        "responses": {
                            "200": {
                                "description": "The loan and the reader's outstanding loan count",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/LoanDetail"}}}
                            },
                            "400": error,
                            "404": error
                        }
                    }
                },
                "/{loan_id}/return": {
                    "post": {
                        "summary": "Mark a loan returned",
                        "tags": ["Loans"],
                        "security": staff,
                        "parameters": [loan_id],
                        "responses": {
                            "200": {"description": "Returned, or already returned"},
                            "400": error,
                            "401": error,
                            "403": error,
                            "404": error
                        }
                    }
                },
                "/health": {
                    "get": {
                        "summary": "Loans health check",
                        "tags": ["Loans"],
                        "responses": {"200": {"description": "OK"}}
                    }
                }
            },
            "components": {
                "schemas": {
                    "ReaderDetails": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "email": {"type": "string", "format": "email"}
                        },
                        "required": ["name", "email"]
                    },
                    "Reader": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer"},
                            "name": {"type": "string"},
                            "email": {"type": "string"}
                        },
                        "required": ["id", "name", "email"]
                    },
                    "LoanLine": {
                        "type": "object",
                        "properties": {
                            "book_id": {"type": "integer"},
                            "title": {"type": "string"},
                            "quantity": {"type": "integer", "minimum": 1}
                        },
                        "required": ["book_id", "title", "quantity"]
                    },
                    "LoanSummary": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer"},
                            "reader": {"$ref": "#/components/schemas/Reader"},
                            "created_at": {"type": "string", "format": "date"},
                            "status": {"type": "string", "enum": ["active", "returned", "late"]},
                            "lines": {"type": "array", "items": {"$ref": "#/components/schemas/LoanLine"}},
                            "total_books": {"type": "integer"}
                        },
                        "required": ["id", "reader", "created_at", "status", "lines", "total_books"]
                    },
                    "LoanDetail": {
                        "allOf": [
                            {"$ref": "#/components/schemas/LoanSummary"},
                            {
                                "type": "object",
                                "properties": {"reader_outstanding_loans": {"type": "integer"}},
                                "required": ["reader_outstanding_loans"]
                            }
                        ]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![ledger::LEDGER_MIGRATION]
    }
}

pub fn create_module(state: AppState) -> Arc<dyn Module> {
    Arc::new(LoansModule::new(state))
}
