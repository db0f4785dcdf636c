//! The catalog is an external collaborator. The kernel only ever asks it how
//! many copies of a title exist.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CirculationError, CirculationResult};
use crate::types::BookId;

pub trait Catalog: Send + Sync {
    /// `None` when the catalog has never heard of the book.
    fn total_copies(&self, book_id: &str) -> CirculationResult<Option<u32>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub book_id: BookId,
    pub total_copies: u32,
}

/// Fixed catalog, typically loaded from a JSON seed file.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    totals: HashMap<BookId, u32>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(mut self, book_id: impl Into<BookId>, total_copies: u32) -> Self {
        self.totals.insert(book_id.into(), total_copies);
        self
    }

    /// Parses a JSON array of `{ "book_id": ..., "total_copies": ... }`.
    pub fn from_json(json: &str) -> CirculationResult<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)
            .map_err(|e| CirculationError::Storage(format!("invalid catalog JSON: {}", e)))?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            totals: entries
                .into_iter()
                .map(|e| (e.book_id, e.total_copies))
                .collect(),
        }
    }

    pub fn book_ids(&self) -> Vec<BookId> {
        let mut ids: Vec<BookId> = self.totals.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Catalog for StaticCatalog {
    fn total_copies(&self, book_id: &str) -> CirculationResult<Option<u32>> {
        Ok(self.totals.get(book_id).copied())
    }
}
