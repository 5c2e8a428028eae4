//! Catalog persistence: genres, books and the deletion guard.

use sqlx::{SqliteExecutor, SqlitePool};

use super::models::{Book, BookFilter, BookId, Genre, ValidBook};
use crate::error::{is_unique_violation, LibraryError, Result};
use crate::modules::loans::models::LoanStatus;

pub(crate) const CATALOG_MIGRATION: libris_kernel::Migration = libris_kernel::Migration {
    id: "001_catalog",
    up: r#"
        CREATE TABLE genre (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK (length(trim(name)) > 0),
            slug TEXT NOT NULL UNIQUE
        );

        CREATE TABLE book (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            title            TEXT NOT NULL CHECK (length(trim(title)) > 0),
            author           TEXT NOT NULL CHECK (length(trim(author)) > 0),
            genre_id         INTEGER NOT NULL REFERENCES genre (id) ON DELETE CASCADE,
            publication_year INTEGER NOT NULL,
            available        INTEGER NOT NULL DEFAULT 1,
            slug             TEXT NOT NULL UNIQUE
        );

        CREATE INDEX book_genre_idx ON book (genre_id);
    "#,
};

const BOOK_COLUMNS: &str = "id, title, author, genre_id, publication_year, available, slug";

pub async fn list_genres(db: impl SqliteExecutor<'_>) -> Result<Vec<Genre>> {
    let genres = sqlx::query_as::<_, Genre>("SELECT id, name, slug FROM genre ORDER BY name, id")
        .fetch_all(db)
        .await?;
    Ok(genres)
}

pub async fn find_genre_by_slug(db: impl SqliteExecutor<'_>, slug: &str) -> Result<Option<Genre>> {
    let genre = sqlx::query_as::<_, Genre>("SELECT id, name, slug FROM genre WHERE slug = ?")
        .bind(slug)
        .fetch_optional(db)
        .await?;
    Ok(genre)
}

pub async fn create_genre(db: impl SqliteExecutor<'_>, name: &str, slug: &str) -> Result<Genre> {
    sqlx::query_as::<_, Genre>("INSERT INTO genre (name, slug) VALUES (?, ?) RETURNING id, name, slug")
        .bind(name)
        .bind(slug)
        .fetch_one(db)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                LibraryError::Conflict(format!("a genre with slug '{}' already exists", slug))
            } else {
                error.into()
            }
        })
}

/// Books ordered by title; restricted to one genre when the filter names one.
///
/// An unknown genre slug is `NotFound` rather than an empty list.
pub async fn list_books(pool: &SqlitePool, filter: &BookFilter) -> Result<Vec<Book>> {
    let Some(genre_slug) = filter.genre.as_deref().filter(|slug| !slug.is_empty()) else {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM book ORDER BY title, id",
            BOOK_COLUMNS
        ))
        .fetch_all(pool)
        .await?;
        return Ok(books);
    };

    let genre = find_genre_by_slug(pool, genre_slug)
        .await?
        .ok_or_else(|| LibraryError::not_found("genre", genre_slug))?;

    let books = sqlx::query_as::<_, Book>(&format!(
        "SELECT {} FROM book WHERE genre_id = ? ORDER BY title, id",
        BOOK_COLUMNS
    ))
    .bind(genre.id)
    .fetch_all(pool)
    .await?;
    Ok(books)
}

pub async fn find_book(db: impl SqliteExecutor<'_>, id: BookId) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM book WHERE id = ?", BOOK_COLUMNS))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(book)
}

pub async fn find_book_by_slug(db: impl SqliteExecutor<'_>, slug: &str) -> Result<Option<Book>> {
    let book =
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM book WHERE slug = ?", BOOK_COLUMNS))
            .bind(slug)
            .fetch_optional(db)
            .await?;
    Ok(book)
}

pub async fn create_book(pool: &SqlitePool, book: &ValidBook) -> Result<Book> {
    let mut tx = libris_db::begin_write(pool).await?;

    let genre_exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM genre WHERE id = ?)")
        .bind(book.genre_id)
        .fetch_one(&mut *tx)
        .await?;
    if !genre_exists {
        return Err(LibraryError::not_found("genre", book.genre_id));
    }

    let created = sqlx::query_as::<_, Book>(&format!(
        "INSERT INTO book (title, author, genre_id, publication_year, available, slug) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
        BOOK_COLUMNS
    ))
    .bind(&book.title)
    .bind(&book.author)
    .bind(book.genre_id)
    .bind(book.publication_year)
    .bind(book.available)
    .bind(&book.slug)
    .fetch_one(&mut *tx)
    .await
    .map_err(|error| {
        if is_unique_violation(&error) {
            LibraryError::Conflict(format!("a book with slug '{}' already exists", book.slug))
        } else {
            error.into()
        }
    })?;

    tx.commit().await?;
    Ok(created)
}

/// Delete a book unless an outstanding loan still references it.
///
/// Items belonging to returned loans are removed together with the book.
pub async fn delete_book(pool: &SqlitePool, slug: &str) -> Result<Book> {
    let mut tx = libris_db::begin_write(pool).await?;

    let book = find_book_by_slug(&mut *tx, slug)
        .await?
        .ok_or_else(|| LibraryError::not_found("book", slug))?;

    let outstanding: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM loan_item
        JOIN loan ON loan.id = loan_item.loan_id
        WHERE loan_item.book_id = ? AND loan.status <> ?
        "#,
    )
    .bind(book.id)
    .bind(LoanStatus::Returned)
    .fetch_one(&mut *tx)
    .await?;

    if outstanding > 0 {
        return Err(LibraryError::Conflict(format!(
            "'{}' is part of an outstanding loan and cannot be deleted",
            book.title
        )));
    }

    let released = sqlx::query("DELETE FROM loan_item WHERE book_id = ?")
        .bind(book.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM book WHERE id = ?")
        .bind(book.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        book_id = %book.id,
        slug = %book.slug,
        returned_items_removed = released,
        "book deleted"
    );
    Ok(book)
}
