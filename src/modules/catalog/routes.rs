use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use libris_authz::Staff;
use libris_http::AppError;
use serde_json::{json, Value};

use super::models::{Book, BookFilter, CreateBook, CreateGenre, Genre};
use super::store;
use crate::error::LibraryError;
use crate::state::AppState;

pub(super) async fn health_check() -> &'static str {
    "catalog module is healthy"
}

pub(super) async fn list_genres(State(state): State<AppState>) -> Result<Json<Vec<Genre>>, AppError> {
    Ok(Json(store::list_genres(&state.db).await?))
}

pub(super) async fn create_genre(
    _staff: Staff,
    State(state): State<AppState>,
    request: Result<Json<CreateGenre>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = request?;
    let (name, slug) = request.validate()?;
    let genre = store::create_genre(&state.db, &name, &slug).await?;
    tracing::info!(genre_id = %genre.id, slug = %genre.slug, "genre created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Genre '{}' created.", genre.name),
            "genre": genre,
        })),
    ))
}

pub(super) async fn list_books(
    State(state): State<AppState>,
    filter: Result<Query<BookFilter>, QueryRejection>,
) -> Result<Json<Vec<Book>>, AppError> {
    let Query(filter) = filter?;
    Ok(Json(store::list_books(&state.db, &filter).await?))
}

pub(super) async fn book_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Book>, AppError> {
    let book = store::find_book_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| LibraryError::not_found("book", &slug))?;
    Ok(Json(book))
}

pub(super) async fn create_book(
    _staff: Staff,
    State(state): State<AppState>,
    request: Result<Json<CreateBook>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = request?;
    let valid = request.validate()?;
    let book = store::create_book(&state.db, &valid).await?;
    tracing::info!(book_id = %book.id, slug = %book.slug, "book created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Book '{}' added to the catalog.", book.title),
            "book": book,
        })),
    ))
}

pub(super) async fn delete_book(
    _staff: Staff,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, AppError> {
    let book = store::delete_book(&state.db, &slug).await?;
    Ok(Json(json!({
        "message": format!("Book '{}' was deleted.", book.title),
    })))
}
