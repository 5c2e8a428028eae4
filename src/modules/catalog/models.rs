use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};
use crate::utils::slugify;

pub const EARLIEST_PUBLICATION_YEAR: i32 = 1000;
pub const LATEST_PUBLICATION_YEAR: i32 = 2100;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct GenreId(pub i64);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct BookId(pub i64);

impl fmt::Display for GenreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
    /// Unique, URL-safe
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub genre_id: GenreId,
    pub publication_year: i32,
    /// False while the book is part of an outstanding loan
    pub available: bool,
    /// Unique, URL-safe; derived from the title when not supplied
    pub slug: String,
}

/// Request model for creating a genre
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGenre {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

impl CreateGenre {
    /// Trimmed name and the slug to store
    pub fn validate(&self) -> Result<(String, String)> {
        let name = non_blank("name", &self.name)?;
        let slug = resolve_slug("slug", self.slug.as_deref(), &name)?;
        Ok((name, slug))
    }
}

/// Request model for creating a book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub genre_id: GenreId,
    pub publication_year: i32,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub slug: Option<String>,
}

fn default_available() -> bool {
    true
}

/// A [`CreateBook`] that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBook {
    pub title: String,
    pub author: String,
    pub genre_id: GenreId,
    pub publication_year: i32,
    pub available: bool,
    pub slug: String,
}

impl CreateBook {
    pub fn validate(&self) -> Result<ValidBook> {
        let title = non_blank("title", &self.title)?;
        let author = non_blank("author", &self.author)?;
        if !(EARLIEST_PUBLICATION_YEAR..=LATEST_PUBLICATION_YEAR).contains(&self.publication_year) {
            return Err(LibraryError::validation(
                "publication_year",
                format!(
                    "must be between {} and {}",
                    EARLIEST_PUBLICATION_YEAR, LATEST_PUBLICATION_YEAR
                ),
            ));
        }
        let slug = resolve_slug("title", self.slug.as_deref(), &title)?;

        Ok(ValidBook {
            title,
            author,
            genre_id: self.genre_id,
            publication_year: self.publication_year,
            available: self.available,
            slug,
        })
    }
}

/// Query parameters for listing books
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookFilter {
    /// Genre slug
    pub genre: Option<String>,
}

fn non_blank(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LibraryError::validation(field, "must not be blank"));
    }
    Ok(trimmed.to_string())
}

/// Explicit slug when given (normalized), otherwise derived from `source`
fn resolve_slug(field: &'static str, explicit: Option<&str>, source: &str) -> Result<String> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(explicit) => slugify(explicit),
        None => slugify(source),
    };
    if slug.is_empty() {
        return Err(LibraryError::validation(
            field,
            "must contain letters or digits to build a URL slug",
        ));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_book(title: &str, year: i32) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: "Gabriel García Márquez".to_string(),
            genre_id: GenreId(1),
            publication_year: year,
            available: true,
            slug: None,
        }
    }

    #[test]
    fn book_slug_is_derived_from_title() {
        let book = create_book("  Cien años de soledad ", 1967).validate().unwrap();
        assert_eq!(book.title, "Cien años de soledad");
        assert_eq!(book.slug, "cien-anos-de-soledad");
    }

    #[test]
    fn publication_year_must_be_plausible() {
        assert!(matches!(
            create_book("Antiguo", 999).validate(),
            Err(LibraryError::Validation {
                field: "publication_year",
                ..
            })
        ));
        assert!(create_book("Futuro", 2100).validate().is_ok());
    }

    #[test]
    fn unsluggable_title_is_rejected() {
        assert!(matches!(
            create_book("???", 2001).validate(),
            Err(LibraryError::Validation { field: "title", .. })
        ));
    }

    #[test]
    fn explicit_genre_slug_is_normalized() {
        let genre = CreateGenre {
            name: "Ciencia ficción".to_string(),
            slug: Some("Ciencia Ficcion".to_string()),
        };
        assert_eq!(
            genre.validate().unwrap(),
            ("Ciencia ficción".to_string(), "ciencia-ficcion".to_string())
        );
    }
}
