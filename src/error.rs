//! Domain errors and their HTTP mapping

use libris_http::AppError;
use serde_json::json;
use thiserror::Error;

use crate::modules::selection::SelectionError;

pub type Result<T, E = LibraryError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{entity} '{key}' does not exist")]
    NotFound { entity: &'static str, key: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LibraryError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// True when the error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

impl From<LibraryError> for AppError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::NotFound { .. } => AppError::not_found(error.to_string()),
            LibraryError::Conflict(message) => AppError::conflict(Vec::new(), message),
            LibraryError::Validation { field, message } => AppError::validation(
                vec![json!({ "field": field, "error": message })],
                format!("{}: {}", field, message),
            ),
            LibraryError::Selection(SelectionError::InvalidQuantity(quantity)) => {
                AppError::validation(
                    vec![json!({ "field": "quantity", "error": "must be a positive integer" })],
                    format!("invalid quantity {}", quantity),
                )
            }
            LibraryError::Selection(error @ SelectionError::Malformed(_)) => {
                AppError::bad_request(error.to_string())
            }
            LibraryError::Database(error) => {
                AppError::Internal(anyhow::Error::new(error).context("database error"))
            }
            LibraryError::Internal(error) => AppError::Internal(error),
        }
    }
}
