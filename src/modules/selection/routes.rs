use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use libris_http::{AppError, VisitorId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::aggregate::{parse_quantity, Selection, SelectionItem};
use super::storage::{discard_selection, load_selection, save_selection};
use crate::error::LibraryError;
use crate::modules::catalog::{models::BookId, store};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct AddParams {
    #[serde(default = "default_quantity")]
    quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// What `GET /api/selection` answers
#[derive(Debug, Serialize)]
pub struct SelectionView {
    pub items: Vec<SelectionItem>,
    pub total_items: u64,
    pub distinct_titles: usize,
}

impl From<&Selection> for SelectionView {
    fn from(selection: &Selection) -> Self {
        Self {
            items: selection.items().cloned().collect(),
            total_items: selection.size(),
            distinct_titles: selection.distinct_titles(),
        }
    }
}

pub(super) async fn health_check() -> &'static str {
    "selection module is healthy"
}

pub(super) async fn selection_detail(
    State(state): State<AppState>,
    Extension(visitor): Extension<VisitorId>,
) -> Result<Json<SelectionView>, AppError> {
    let selection = load_selection(&state, &visitor).await?;
    Ok(Json(SelectionView::from(&selection)))
}

pub(super) async fn add_book(
    State(state): State<AppState>,
    Extension(visitor): Extension<VisitorId>,
    Path(book_slug): Path<String>,
    params: Result<Query<AddParams>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(params) = params?;
    let quantity = parse_quantity(params.quantity).map_err(LibraryError::from)?;
    let book = store::find_book_by_slug(&state.db, &book_slug)
        .await?
        .ok_or_else(|| LibraryError::not_found("book", &book_slug))?;

    if !book.available {
        return Err(LibraryError::Conflict(format!(
            "'{}' is currently on loan and cannot be selected",
            book.title
        ))
        .into());
    }

    let mut selection = load_selection(&state, &visitor).await?;
    selection.add(&book, quantity).map_err(LibraryError::from)?;
    save_selection(&state, &visitor, &selection).await?;

    Ok(Json(json!({
        "message": format!("'{}' added to your selection.", book.title),
        "total_items": selection.size(),
    })))
}

pub(super) async fn remove_book(
    State(state): State<AppState>,
    Extension(visitor): Extension<VisitorId>,
    book_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(book_id) = book_id?;
    let mut selection = load_selection(&state, &visitor).await?;

    let message = match selection.get(BookId(book_id)).map(|item| item.title().to_string()) {
        Some(title) => {
            selection.remove(BookId(book_id));
            save_selection(&state, &visitor, &selection).await?;
            format!("'{}' removed from your selection.", title)
        }
        None => "That book was not in your selection.".to_string(),
    };

    Ok(Json(json!({
        "message": message,
        "total_items": selection.size(),
    })))
}

pub(super) async fn clear_selection(
    State(state): State<AppState>,
    Extension(visitor): Extension<VisitorId>,
) -> Result<Json<Value>, AppError> {
    discard_selection(&state, &visitor).await?;
    Ok(Json(json!({
        "message": "Your selection is now empty.",
        "total_items": 0,
    })))
}
