//! Authoritative copy counters, one per book.
//!
//! Each book's `(total, available)` pair lives in a single `AtomicU64`
//! (total in the high half, available in the low half), so every mutation is
//! a single compare-and-swap. The outer map is only write-locked when a book
//! is first registered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{CirculationError, CirculationResult};
use crate::types::{Availability, BookId};

#[derive(Debug)]
struct CopyCounter(AtomicU64);

fn pack(total: u32, available: u32) -> u64 {
    (u64::from(total) << 32) | u64::from(available)
}

fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

impl CopyCounter {
    fn load(&self) -> (u32, u32) {
        unpack(self.0.load(Ordering::Acquire))
    }
}

#[derive(Debug, Default)]
pub struct AvailabilityLedger {
    books: RwLock<HashMap<BookId, Arc<CopyCounter>>>,
}

impl AvailabilityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, book_id: &str) -> Option<Arc<CopyCounter>> {
        self.books.read().get(book_id).cloned()
    }

    /// Installs or replaces a book's counters from its catalog total and the
    /// number of copies currently out on loan.
    pub fn register_book(
        &self,
        book_id: &str,
        total_copies: u32,
        on_loan: u32,
    ) -> CirculationResult<Availability> {
        if on_loan > total_copies {
            return Err(CirculationError::invariant(format!(
                "book '{}' has {} open loans but only {} copies",
                book_id, on_loan, total_copies
            )));
        }
        let word = pack(total_copies, total_copies - on_loan);

        let mut books = self.books.write();
        match books.get(book_id) {
            Some(counter) => counter.0.store(word, Ordering::Release),
            None => {
                books.insert(book_id.to_string(), Arc::new(CopyCounter(AtomicU64::new(word))));
            }
        }

        Ok(Availability {
            book_id: book_id.to_string(),
            total_copies,
            available_copies: total_copies - on_loan,
        })
    }

    pub fn is_registered(&self, book_id: &str) -> bool {
        self.books.read().contains_key(book_id)
    }

    /// Takes one copy if any is free. Never blocks; returns false and leaves
    /// the counters untouched when none is free or the book is unknown.
    pub fn try_reserve_copy(&self, book_id: &str) -> bool {
        let Some(counter) = self.counter(book_id) else {
            tracing::debug!(book_id, "Reserve on unregistered book");
            return false;
        };

        counter
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (total, available) = unpack(word);
                (available > 0).then(|| pack(total, available - 1))
            })
            .is_ok()
    }

    /// Puts one copy back. Exceeding `total_copies` means some caller
    /// released a copy it never took, and is reported rather than clamped.
    pub fn release_copy(&self, book_id: &str) -> CirculationResult<()> {
        let counter = self.counter(book_id).ok_or_else(|| {
            CirculationError::invariant(format!("release on unregistered book '{}'", book_id))
        })?;

        counter
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (total, available) = unpack(word);
                (available < total).then(|| pack(total, available + 1))
            })
            .map(|_| ())
            .map_err(|word| {
                let (total, _) = unpack(word);
                CirculationError::invariant(format!(
                    "release would push book '{}' above its {} copies",
                    book_id, total
                ))
            })
    }

    pub fn availability(&self, book_id: &str) -> Option<Availability> {
        self.counter(book_id).map(|counter| {
            let (total_copies, available_copies) = counter.load();
            Availability {
                book_id: book_id.to_string(),
                total_copies,
                available_copies,
            }
        })
    }

    /// Snapshot of every registered book, sorted by id.
    pub fn books(&self) -> Vec<Availability> {
        let books = self.books.read();
        let mut out: Vec<Availability> = books
            .iter()
            .map(|(book_id, counter)| {
                let (total_copies, available_copies) = counter.load();
                Availability {
                    book_id: book_id.clone(),
                    total_copies,
                    available_copies,
                }
            })
            .collect();
        out.sort_by(|a, b| a.book_id.cmp(&b.book_id));
        out
    }
}
