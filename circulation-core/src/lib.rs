//! # circulation-core
//!
//! Loan and reservation lifecycle kernel for a lending library.
//! Tracks which copies of each book are out, serves reservations in FIFO
//! order, computes overdue fines, and keeps every book's availability exact
//! under concurrent borrowers.

pub mod catalog;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod ledger;
pub mod loans;
pub mod policy;
pub mod reservations;
pub mod types;

#[cfg(test)]
mod ledger_test;
#[cfg(test)]
mod reservations_test;
