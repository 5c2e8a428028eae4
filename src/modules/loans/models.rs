use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::modules::catalog::models::BookId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ReaderId(pub i64);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct LoanId(pub i64);

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a loan. Nothing assigns `Late` yet; it counts as outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
    Late,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
            LoanStatus::Late => "late",
        }
    }

    /// Whether the loan still holds its books
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Reader {
    pub id: ReaderId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Loan {
    pub id: LoanId,
    pub reader_id: ReaderId,
    pub created_at: NaiveDate,
    pub status: LoanStatus,
}

/// Borrower form submitted at checkout
#[derive(Debug, Clone, Deserialize)]
pub struct ReaderDetails {
    pub name: String,
    pub email: String,
}

impl ReaderDetails {
    /// Trimmed copy, with the email checked for a plausible shape
    pub fn validate(&self) -> Result<ReaderDetails> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LibraryError::validation("name", "must not be blank"));
        }

        let email = self.email.trim();
        if !is_plausible_email(email) {
            return Err(LibraryError::validation(
                "email",
                "must be a valid email address",
            ));
        }

        Ok(ReaderDetails {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// One borrowed title inside a [`LoanSummary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LoanLine {
    pub book_id: BookId,
    pub title: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanSummary {
    pub id: LoanId,
    pub reader: Reader,
    pub created_at: NaiveDate,
    pub status: LoanStatus,
    pub lines: Vec<LoanLine>,
    /// Sum of line quantities
    pub total_books: i64,
}

/// A loan as shown after checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanDetail {
    #[serde(flatten)]
    pub loan: LoanSummary,
    /// Outstanding loans held by the same reader, this one included
    pub reader_outstanding_loans: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
    Returned { books_released: u64 },
    AlreadyDone,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, email: &str) -> ReaderDetails {
        ReaderDetails {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn reader_details_are_trimmed() {
        let valid = details("  Ana Pérez ", " ana@example.org ")
            .validate()
            .unwrap();
        assert_eq!(valid.name, "Ana Pérez");
        assert_eq!(valid.email, "ana@example.org");
    }

    #[test]
    fn implausible_emails_are_rejected() {
        for email in ["", "ana", "ana@", "@example.org", "ana@example", "a b@example.org", "ana@ex@ample.org"] {
            assert!(
                matches!(
                    details("Ana", email).validate(),
                    Err(LibraryError::Validation { field: "email", .. })
                ),
                "accepted {:?}",
                email
            );
        }
    }

    #[test]
    fn blank_name_is_rejected() {
        assert!(matches!(
            details("   ", "ana@example.org").validate(),
            Err(LibraryError::Validation { field: "name", .. })
        ));
    }

    #[test]
    fn only_returned_loans_release_their_books() {
        assert!(LoanStatus::Active.is_outstanding());
        assert!(LoanStatus::Late.is_outstanding());
        assert!(!LoanStatus::Returned.is_outstanding());
        assert_eq!(LoanStatus::Late.to_string(), "late");
        assert_eq!(
            serde_json::to_value(LoanStatus::Returned).unwrap(),
            serde_json::json!(LoanStatus::Returned.as_str())
        );
    }
}
