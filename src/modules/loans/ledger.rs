//! Loan ledger: readers, loans and their items.
//!
//! Checkout and return each run in a single transaction. A failure at any step
//! drops the transaction, so no reader, loan, item or availability change
//! outlives it.

use chrono::Utc;
use sqlx::{Sqlite, SqliteExecutor, SqlitePool, Transaction};

use super::models::{
    Loan, LoanDetail, LoanId, LoanLine, LoanStatus, LoanSummary, Reader, ReaderDetails,
    ReaderId, ReturnOutcome,
};
use crate::error::{LibraryError, Result};
use crate::modules::catalog::store::find_book;
use crate::modules::selection::Selection;

pub(crate) const LEDGER_MIGRATION: libris_kernel::Migration = libris_kernel::Migration {
    id: "001_ledger",
    up: r#"
        CREATE TABLE reader (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            name  TEXT NOT NULL,
            email TEXT NOT NULL
        );

        CREATE INDEX reader_email_idx ON reader (email);

        CREATE TABLE loan (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            reader_id  INTEGER NOT NULL REFERENCES reader (id) ON DELETE CASCADE,
            created_at DATE NOT NULL,
            status     TEXT NOT NULL DEFAULT 'active'
                       CHECK (status IN ('active', 'returned', 'late'))
        );

        CREATE TABLE loan_item (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            loan_id  INTEGER NOT NULL REFERENCES loan (id) ON DELETE CASCADE,
            book_id  INTEGER NOT NULL REFERENCES book (id) ON DELETE RESTRICT,
            quantity INTEGER NOT NULL DEFAULT 1 CHECK (quantity >= 1)
        );

        CREATE INDEX loan_item_loan_idx ON loan_item (loan_id);
        CREATE INDEX loan_item_book_idx ON loan_item (book_id);
    "#,
};

/// Turn `selection` into a loan for the reader identified by `details.email`.
///
/// The selection is cleared only after the transaction commits; on error it is
/// left exactly as it was.
pub async fn create_loan(
    pool: &SqlitePool,
    details: &ReaderDetails,
    selection: &mut Selection,
) -> Result<LoanId> {
    let details = details.validate()?;
    if selection.is_empty() {
        return Err(LibraryError::validation(
            "selection",
            "select at least one book before creating a loan",
        ));
    }

    let mut tx = libris_db::begin_write(pool).await?;

    let reader = resolve_reader(&mut tx, &details).await?;

    let loan_id: LoanId = sqlx::query_scalar(
        "INSERT INTO loan (reader_id, created_at, status) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(reader.id)
    .bind(Utc::now().date_naive())
    .bind(LoanStatus::Active)
    .fetch_one(&mut *tx)
    .await?;

    for entry in selection.items() {
        let book = find_book(&mut *tx, entry.book_id())
            .await?
            .ok_or_else(|| LibraryError::not_found("book", entry.book_id()))?;

        sqlx::query("INSERT INTO loan_item (loan_id, book_id, quantity) VALUES (?, ?, ?)")
            .bind(loan_id)
            .bind(book.id)
            .bind(i64::from(entry.quantity()))
            .execute(&mut *tx)
            .await?;

        let claimed = sqlx::query("UPDATE book SET available = 0 WHERE id = ? AND available = 1")
            .bind(book.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if claimed == 0 {
            return Err(LibraryError::Conflict(format!(
                "'{}' is already on loan",
                book.title
            )));
        }
    }

    tx.commit().await?;

    tracing::info!(
        loan_id = %loan_id,
        reader_id = %reader.id,
        items = selection.distinct_titles(),
        books = selection.size(),
        "loan created"
    );
    selection.clear();
    Ok(loan_id)
}

/// Existing reader with this email (name kept as stored), or a new one
async fn resolve_reader(
    tx: &mut Transaction<'_, Sqlite>,
    details: &ReaderDetails,
) -> Result<Reader> {
    let existing = sqlx::query_as::<_, Reader>(
        "SELECT id, name, email FROM reader WHERE email = ? ORDER BY id LIMIT 1",
    )
    .bind(&details.email)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(reader) = existing {
        return Ok(reader);
    }

    let reader = sqlx::query_as::<_, Reader>(
        "INSERT INTO reader (name, email) VALUES (?, ?) RETURNING id, name, email",
    )
    .bind(&details.name)
    .bind(&details.email)
    .fetch_one(&mut **tx)
    .await?;
    tracing::debug!(reader_id = %reader.id, "reader created");
    Ok(reader)
}

/// Mark a loan returned and release every book it holds
pub async fn return_loan(pool: &SqlitePool, loan_id: LoanId) -> Result<ReturnOutcome> {
    let mut tx = libris_db::begin_write(pool).await?;

    let loan = find_loan(&mut *tx, loan_id)
        .await?
        .ok_or_else(|| LibraryError::not_found("loan", loan_id))?;

    if !loan.status.is_outstanding() {
        return Ok(ReturnOutcome::AlreadyDone);
    }

    sqlx::query("UPDATE loan SET status = ? WHERE id = ?")
        .bind(LoanStatus::Returned)
        .bind(loan_id)
        .execute(&mut *tx)
        .await?;

    let books_released = sqlx::query(
        "UPDATE book SET available = 1 WHERE id IN (SELECT book_id FROM loan_item WHERE loan_id = ?)",
    )
    .bind(loan_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    tracing::info!(loan_id = %loan_id, was = %loan.status, books_released, "loan returned");
    Ok(ReturnOutcome::Returned { books_released })
}

pub async fn find_loan(db: impl SqliteExecutor<'_>, loan_id: LoanId) -> Result<Option<Loan>> {
    let loan = sqlx::query_as::<_, Loan>(
        "SELECT id, reader_id, created_at, status FROM loan WHERE id = ?",
    )
    .bind(loan_id)
    .fetch_optional(db)
    .await?;
    Ok(loan)
}

/// Every loan, newest first
pub async fn list_loans(pool: &SqlitePool) -> Result<Vec<LoanSummary>> {
    let loans = sqlx::query_as::<_, Loan>(
        "SELECT id, reader_id, created_at, status FROM loan ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut summaries = Vec::with_capacity(loans.len());
    for loan in loans {
        summaries.push(summarize(pool, loan).await?);
    }
    Ok(summaries)
}

pub async fn loan_detail(pool: &SqlitePool, loan_id: LoanId) -> Result<LoanDetail> {
    let loan = find_loan(pool, loan_id)
        .await?
        .ok_or_else(|| LibraryError::not_found("loan", loan_id))?;
    let reader_id = loan.reader_id;

    let summary = summarize(pool, loan).await?;
    let reader_outstanding_loans = outstanding_loans(pool, reader_id).await?;

    Ok(LoanDetail {
        loan: summary,
        reader_outstanding_loans,
    })
}

/// Loans of `reader` that have not been returned
pub async fn outstanding_loans(db: impl SqliteExecutor<'_>, reader: ReaderId) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM loan WHERE reader_id = ? AND status <> ?",
    )
    .bind(reader)
    .bind(LoanStatus::Returned)
    .fetch_one(db)
    .await?;
    Ok(count)
}

async fn summarize(pool: &SqlitePool, loan: Loan) -> Result<LoanSummary> {
    let reader = sqlx::query_as::<_, Reader>("SELECT id, name, email FROM reader WHERE id = ?")
        .bind(loan.reader_id)
        .fetch_one(pool)
        .await?;

    let lines = sqlx::query_as::<_, LoanLine>(
        r#"
        SELECT loan_item.book_id AS book_id, book.title AS title, loan_item.quantity AS quantity
        FROM loan_item
        JOIN book ON book.id = loan_item.book_id
        WHERE loan_item.loan_id = ?
        ORDER BY loan_item.id
        "#,
    )
    .bind(loan.id)
    .fetch_all(pool)
    .await?;

    let total_books = lines.iter().map(|line| line.quantity).sum();

    Ok(LoanSummary {
        id: loan.id,
        reader,
        created_at: loan.created_at,
        status: loan.status,
        lines,
        total_books,
    })
}
