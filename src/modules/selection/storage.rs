//! Moving a [`Selection`] in and out of the visitor's session

use anyhow::Context;
use libris_http::VisitorId;

use super::aggregate::Selection;
use crate::error::Result;
use crate::state::AppState;

/// The visitor's selection; empty when the slot was never written
pub async fn load_selection(state: &AppState, visitor: &VisitorId) -> Result<Selection> {
    let stored = state.sessions.load(visitor, &state.selection_slot).await?;
    let selection = match stored {
        Some(value) => Selection::from_value(value)?,
        None => Selection::new(),
    };
    Ok(selection)
}

pub async fn save_selection(
    state: &AppState,
    visitor: &VisitorId,
    selection: &Selection,
) -> Result<()> {
    let value = selection
        .to_value()
        .context("failed to encode the selection")?;
    state
        .sessions
        .save(visitor, &state.selection_slot, value)
        .await?;
    Ok(())
}

/// Forget the visitor's selection; the next load sees an empty one
pub async fn discard_selection(state: &AppState, visitor: &VisitorId) -> Result<()> {
    state.sessions.remove(visitor, &state.selection_slot).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use libris_kernel::settings::Settings;
    use serde_json::json;

    use super::*;
    use crate::error::LibraryError;
    use crate::modules::catalog::models::{Book, BookId, GenreId};
    use crate::modules::selection::SelectionError;
    use crate::session::{MemorySessionStore, SessionStore};

    async fn state() -> AppState {
        let pool = libris_db::connect_in_memory().await.unwrap();
        AppState::new(
            pool,
            Arc::new(MemorySessionStore::new()),
            &Settings::default(),
        )
    }

    #[tokio::test]
    async fn missing_slot_loads_empty() {
        let state = state().await;
        let selection = load_selection(&state, &VisitorId::generate()).await.unwrap();
        assert!(selection.is_empty());
    }

    #[tokio::test]
    async fn saved_selection_is_loaded_back() {
        let state = state().await;
        let visitor = VisitorId::generate();
        let book = Book {
            id: BookId(3),
            title: "La casa de los espíritus".to_string(),
            author: "Isabel Allende".to_string(),
            genre_id: GenreId(1),
            publication_year: 1982,
            available: true,
            slug: "la-casa-de-los-espiritus".to_string(),
        };

        let mut selection = Selection::new();
        selection.add(&book, 2).unwrap();
        save_selection(&state, &visitor, &selection).await.unwrap();

        assert_eq!(load_selection(&state, &visitor).await.unwrap(), selection);
    }

    #[tokio::test]
    async fn corrupt_slot_is_reported() {
        let state = state().await;
        let visitor = VisitorId::generate();
        state
            .sessions
            .save(&visitor, &state.selection_slot, json!({"1": {"book_id": 1}}))
            .await
            .unwrap();

        assert!(matches!(
            load_selection(&state, &visitor).await,
            Err(LibraryError::Selection(SelectionError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn discarding_recovers_from_a_corrupt_slot() {
        let state = state().await;
        let visitor = VisitorId::generate();
        state
            .sessions
            .save(&visitor, &state.selection_slot, json!("not a selection"))
            .await
            .unwrap();

        discard_selection(&state, &visitor).await.unwrap();
        assert!(load_selection(&state, &visitor).await.unwrap().is_empty());
    }
}
