use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use libris_authz::Staff;
use libris_http::{AppError, VisitorId};
use serde_json::json;

use super::ledger;
use super::models::{LoanDetail, LoanId, LoanSummary, ReaderDetails, ReturnOutcome};
use crate::modules::selection::{load_selection, save_selection};
use crate::state::AppState;

pub(super) async fn health_check() -> &'static str {
    "loans module is healthy"
}

/// Check out the visitor's selection for the named reader
pub(super) async fn create_loan(
    _staff: Staff,
    State(state): State<AppState>,
    Extension(visitor): Extension<VisitorId>,
    details: Result<Json<ReaderDetails>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(details) = details?;
    let mut selection = load_selection(&state, &visitor).await?;
    let loan_id = ledger::create_loan(&state.db, &details, &mut selection).await?;

    // The loan is already committed.
    if let Err(error) = save_selection(&state, &visitor, &selection).await {
        tracing::warn!(
            loan_id = %loan_id,
            visitor = %visitor,
            error = %error,
            "loan created but the selection could not be cleared"
        );
    }

    let location = HeaderValue::from_str(&format!("/api/loans/{}", loan_id))
        .map_err(|error| AppError::Internal(error.into()))?;
    let body = Json(json!({
        "message": format!("Loan created for {}.", details.name.trim()),
        "loan_id": loan_id,
    }));

    Ok((StatusCode::CREATED, [(header::LOCATION, location)], body).into_response())
}

pub(super) async fn list_loans(
    _staff: Staff,
    State(state): State<AppState>,
) -> Result<Json<Vec<LoanSummary>>, AppError> {
    Ok(Json(ledger::list_loans(&state.db).await?))
}

pub(super) async fn loan_detail(
    State(state): State<AppState>,
    loan_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<LoanDetail>, AppError> {
    let Path(loan_id) = loan_id?;
    Ok(Json(ledger::loan_detail(&state.db, LoanId(loan_id)).await?))
}

pub(super) async fn return_loan(
    _staff: Staff,
    State(state): State<AppState>,
    loan_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Path(loan_id) = loan_id?;
    let body = match ledger::return_loan(&state.db, LoanId(loan_id)).await? {
        ReturnOutcome::Returned { books_released } => json!({
            "message": format!("Loan {} returned.", loan_id),
            "outcome": "returned",
            "books_released": books_released,
        }),
        ReturnOutcome::AlreadyDone => json!({
            "message": format!("Loan {} was already returned.", loan_id),
            "outcome": "already_returned",
            "books_released": 0,
        }),
    };
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{body::Body, http::Request, routing::post, Router};
    use libris_kernel::settings::Settings;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::modules::catalog::store::{
        create_genre, find_book,
        tests::{catalog_pool, seed_book},
    };
    use crate::modules::selection::Selection;
    use crate::session::{MemorySessionStore, SessionStore};

    /// Reads work, writes fail
    struct ReadOnlySessions(MemorySessionStore);

    #[async_trait]
    impl SessionStore for ReadOnlySessions {
        async fn load(&self, visitor: &VisitorId, slot: &str) -> anyhow::Result<Option<Value>> {
            self.0.load(visitor, slot).await
        }

        async fn save(&self, _: &VisitorId, _: &str, _: Value) -> anyhow::Result<()> {
            anyhow::bail!("session store is read-only")
        }

        async fn remove(&self, _: &VisitorId, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("session store is read-only")
        }

        async fn purge_idle(&self, _: Duration) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn committed_loan_is_reported_even_if_the_selection_is_not_cleared() {
        let pool = catalog_pool().await;
        let genre = create_genre(&pool, "Novela", "novela").await.unwrap();
        let book = seed_book(&pool, genre.id, "Rayuela").await;

        let mut settings = Settings::default();
        settings.auth.staff_token = Some("desk".to_string());
        let visitor = VisitorId::generate();
        let sessions = ReadOnlySessions(MemorySessionStore::new());
        let mut selection = Selection::new();
        selection.add(&book, 1).unwrap();
        sessions
            .0
            .save(&visitor, &settings.session.selection_key, selection.to_value().unwrap())
            .await
            .unwrap();

        let state = AppState::new(pool.clone(), Arc::new(sessions), &settings);
        let router = Router::new()
            .route("/", post(create_loan))
            .with_state(state)
            .layer(Extension(visitor));

        let response = router
            .oneshot(
                Request::post("/")
                    .header(header::AUTHORIZATION, "Bearer desk")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({"name": "Ana", "email": "ana@example.org"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key(header::LOCATION));
        assert!(!find_book(&pool, book.id).await.unwrap().unwrap().available);
    }
}

