//! The loan selection: a visitor's borrow list, kept in session state between
//! requests.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modules::catalog::models::{Book, BookId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("quantity must be a positive integer, got {0}")]
    InvalidQuantity(i64),

    #[error("stored selection is malformed: {0}")]
    Malformed(String),
}

/// Validate a caller-supplied quantity
pub fn parse_quantity(raw: i64) -> Result<u32, SelectionError> {
    u32::try_from(raw)
        .ok()
        .filter(|quantity| *quantity > 0)
        .ok_or(SelectionError::InvalidQuantity(raw))
}

/// One chosen book. The quantity is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionItem {
    book_id: BookId,
    title: String,
    quantity: u32,
}

impl SelectionItem {
    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    /// Title as it was when the book was first added
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// Stored form of one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntryRecord {
    pub book_id: i64,
    pub title: String,
    pub quantity: i64,
}

/// Stored form of a whole selection, keyed by the decimal book id
pub type SelectionRecord = BTreeMap<String, SelectionEntryRecord>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    items: BTreeMap<BookId, SelectionItem>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` copies of `book`, merging with an existing entry.
    ///
    /// A repeated add keeps the title captured the first time.
    pub fn add(&mut self, book: &Book, quantity: u32) -> Result<(), SelectionError> {
        if quantity == 0 {
            return Err(SelectionError::InvalidQuantity(0));
        }

        match self.items.get_mut(&book.id) {
            Some(item) => {
                item.quantity = item
                    .quantity
                    .checked_add(quantity)
                    .ok_or(SelectionError::InvalidQuantity(
                        i64::from(item.quantity) + i64::from(quantity),
                    ))?;
            }
            None => {
                self.items.insert(
                    book.id,
                    SelectionItem {
                        book_id: book.id,
                        title: book.title.clone(),
                        quantity,
                    },
                );
            }
        }
        Ok(())
    }

    /// Drop the entry for `book_id`; returns whether one existed
    pub fn remove(&mut self, book_id: BookId) -> bool {
        self.items.remove(&book_id).is_some()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Total number of copies across all entries
    pub fn size(&self) -> u64 {
        self.items.values().map(|item| u64::from(item.quantity)).sum()
    }

    pub fn distinct_titles(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, book_id: BookId) -> Option<&SelectionItem> {
        self.items.get(&book_id)
    }

    /// Entries ordered by book id
    pub fn items(&self) -> impl Iterator<Item = &SelectionItem> {
        self.items.values()
    }

    pub fn to_record(&self) -> SelectionRecord {
        self.items
            .values()
            .map(|item| {
                (
                    item.book_id.to_string(),
                    SelectionEntryRecord {
                        book_id: item.book_id.0,
                        title: item.title.clone(),
                        quantity: i64::from(item.quantity),
                    },
                )
            })
            .collect()
    }

    /// Rebuild from a stored record.
    ///
    /// Entries are keyed by their own `book_id`; the record's keys are ignored.
    pub fn from_record(record: SelectionRecord) -> Result<Self, SelectionError> {
        let mut items = BTreeMap::new();
        let mut seen = BTreeSet::new();

        for (key, entry) in record {
            let quantity = parse_quantity(entry.quantity).map_err(|_| {
                SelectionError::Malformed(format!(
                    "entry '{}' has quantity {}",
                    key, entry.quantity
                ))
            })?;
            let book_id = BookId(entry.book_id);
            if !seen.insert(book_id) {
                return Err(SelectionError::Malformed(format!(
                    "book {} appears more than once",
                    book_id
                )));
            }
            items.insert(
                book_id,
                SelectionItem {
                    book_id,
                    title: entry.title,
                    quantity,
                },
            );
        }

        Ok(Self { items })
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.to_record())
    }

    /// Parse a session slot. `null` is an empty selection.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SelectionError> {
        if value.is_null() {
            return Ok(Self::new());
        }
        let record: SelectionRecord = serde_json::from_value(value)
            .map_err(|error| SelectionError::Malformed(error.to_string()))?;
        Self::from_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::models::GenreId;
    use serde_json::json;

    fn book(id: i64, title: &str) -> Book {
        Book {
            id: BookId(id),
            title: title.to_string(),
            author: "Jorge Luis Borges".to_string(),
            genre_id: GenreId(1),
            publication_year: 1944,
            available: true,
            slug: format!("book-{}", id),
        }
    }

    #[test]
    fn repeated_adds_merge_and_keep_first_title() {
        let mut selection = Selection::new();
        let mut ficciones = book(1, "Ficciones");
        selection.add(&ficciones, 2).unwrap();

        ficciones.title = "Ficciones (edición revisada)".to_string();
        selection.add(&ficciones, 3).unwrap();

        assert_eq!(selection.distinct_titles(), 1);
        let item = selection.get(BookId(1)).unwrap();
        assert_eq!(item.quantity(), 5);
        assert_eq!(item.title(), "Ficciones");
        assert_eq!(selection.size(), 5);
    }

    #[test]
    fn size_counts_copies_not_titles() {
        let mut selection = Selection::new();
        selection.add(&book(1, "Ficciones"), 2).unwrap();
        selection.add(&book(2, "El Aleph"), 1).unwrap();
        selection.add(&book(3, "Rayuela"), 4).unwrap();
        assert_eq!(selection.size(), 7);
        assert_eq!(selection.distinct_titles(), 3);

        selection.remove(BookId(3));
        assert_eq!(selection.size(), 3);

        selection.clear();
        assert_eq!(selection.size(), 0);
        assert!(selection.is_empty());
    }

    #[test]
    fn zero_quantity_is_rejected_without_change() {
        let mut selection = Selection::new();
        selection.add(&book(1, "Ficciones"), 1).unwrap();
        let before = selection.clone();

        assert_eq!(
            selection.add(&book(1, "Ficciones"), 0),
            Err(SelectionError::InvalidQuantity(0))
        );
        assert_eq!(selection, before);
    }

    #[test]
    fn overflowing_quantity_is_rejected_without_change() {
        let mut selection = Selection::new();
        selection.add(&book(1, "Ficciones"), u32::MAX).unwrap();

        assert!(matches!(
            selection.add(&book(1, "Ficciones"), 1),
            Err(SelectionError::InvalidQuantity(_))
        ));
        assert_eq!(selection.get(BookId(1)).unwrap().quantity(), u32::MAX);
    }

    #[test]
    fn parse_quantity_accepts_only_positive_values() {
        assert_eq!(parse_quantity(3), Ok(3));
        assert_eq!(parse_quantity(0), Err(SelectionError::InvalidQuantity(0)));
        assert_eq!(parse_quantity(-2), Err(SelectionError::InvalidQuantity(-2)));
        assert!(parse_quantity(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn removing_absent_book_is_a_no_op() {
        let mut selection = Selection::new();
        selection.add(&book(1, "Ficciones"), 2).unwrap();
        let before = selection.clone();

        assert!(!selection.remove(BookId(99)));
        assert_eq!(selection, before);
    }

    #[test]
    fn round_trip_through_session_value() {
        let mut selection = Selection::new();
        selection.add(&book(10, "Pedro Páramo"), 2).unwrap();
        selection.add(&book(2, "Aura"), 1).unwrap();

        let value = selection.to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "10": {"book_id": 10, "title": "Pedro Páramo", "quantity": 2},
                "2": {"book_id": 2, "title": "Aura", "quantity": 1}
            })
        );

        let restored = Selection::from_value(value).unwrap();
        assert_eq!(restored, selection);
    }

    #[test]
    fn loading_rekeys_entries_by_book_id() {
        let stored = json!({
            "first": {"book_id": 4, "title": "Aura", "quantity": 1},
            "0004": {"book_id": 9, "title": "Rayuela", "quantity": 2}
        });

        let mut selection = Selection::from_value(stored).unwrap();
        assert_eq!(selection.get(BookId(4)).unwrap().title(), "Aura");
        assert_eq!(selection.get(BookId(9)).unwrap().quantity(), 2);

        assert!(selection.remove(BookId(9)));
        selection.add(&book(4, "Aura"), 1).unwrap();
        assert_eq!(selection.size(), 2);
    }

    #[test]
    fn null_or_empty_slot_is_an_empty_selection() {
        assert!(Selection::from_value(serde_json::Value::Null)
            .unwrap()
            .is_empty());
        assert!(Selection::from_value(json!({})).unwrap().is_empty());
    }

    #[test]
    fn malformed_records_are_rejected() {
        let missing_title = json!({"1": {"book_id": 1, "quantity": 1}});
        let zero_quantity = json!({"1": {"book_id": 1, "title": "Aura", "quantity": 0}});
        let duplicate = json!({
            "1": {"book_id": 1, "title": "Aura", "quantity": 1},
            "01": {"book_id": 1, "title": "Aura", "quantity": 2}
        });
        let not_a_map = json!([1, 2, 3]);

        for stored in [missing_title, zero_quantity, duplicate, not_a_map] {
            assert!(matches!(
                Selection::from_value(stored),
                Err(SelectionError::Malformed(_))
            ));
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::Config;

        #[derive(Debug, Clone)]
        enum Edit {
            Add(i64, u32),
            Remove(i64),
            Clear,
        }

        fn edit() -> impl Strategy<Value = Edit> {
            prop_oneof![
                6 => (0_i64..12, 1_u32..1_000).prop_map(|(id, quantity)| Edit::Add(id, quantity)),
                3 => (0_i64..12).prop_map(Edit::Remove),
                1 => Just(Edit::Clear),
            ]
        }

        fn apply(edits: &[Edit]) -> (Selection, BTreeMap<i64, u64>) {
            let mut selection = Selection::new();
            let mut expected: BTreeMap<i64, u64> = BTreeMap::new();
            for edit in edits {
                match *edit {
                    Edit::Add(id, quantity) => {
                        selection.add(&book(id, &format!("Libro {}", id)), quantity).unwrap();
                        *expected.entry(id).or_default() += u64::from(quantity);
                    }
                    Edit::Remove(id) => {
                        selection.remove(BookId(id));
                        expected.remove(&id);
                    }
                    Edit::Clear => {
                        selection.clear();
                        expected.clear();
                    }
                }
            }
            (selection, expected)
        }

        proptest! {
            #![proptest_config(Config::with_cases(256))]

            #[test]
            fn size_is_the_sum_of_quantities(edits in prop::collection::vec(edit(), 0..120)) {
                let (selection, expected) = apply(&edits);

                prop_assert_eq!(selection.size(), expected.values().sum::<u64>());
                prop_assert_eq!(selection.distinct_titles(), expected.len());
                prop_assert!(selection.items().all(|item| item.quantity() >= 1));
                for (id, quantity) in &expected {
                    let item = selection.get(BookId(*id)).unwrap();
                    prop_assert_eq!(u64::from(item.quantity()), *quantity);
                }
            }

            #[test]
            fn session_value_round_trips(edits in prop::collection::vec(edit(), 0..120)) {
                let (selection, _) = apply(&edits);

                let value = selection.to_value().unwrap();
                prop_assert_eq!(Selection::from_value(value).unwrap(), selection);
            }
        }
    }
}
