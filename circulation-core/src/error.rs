//! Error types for circulation operations.

use thiserror::Error;

use crate::types::{BookId, LoanId, ReservationId, ReservationStatus};

/// Result type for circulation operations.
pub type CirculationResult<T> = Result<T, CirculationError>;

/// Everything a circulation operation can fail with.
#[derive(Debug, Error)]
pub enum CirculationError {
    /// Borrow attempted while every copy is out.
    #[error("no copy of book '{book_id}' is available")]
    NoCopyAvailable { book_id: BookId },

    #[error("loan {loan_id} not found")]
    LoanNotFound { loan_id: LoanId },

    /// Second return of the same loan.
    #[error("loan {loan_id} was already returned")]
    AlreadyReturned { loan_id: LoanId },

    #[error("reservation {reservation_id} not found")]
    ReservationNotFound { reservation_id: ReservationId },

    /// Cancel on a reservation that already left the queue.
    #[error("reservation {reservation_id} is {status}, not queued")]
    NotQueued {
        reservation_id: ReservationId,
        status: ReservationStatus,
    },

    /// Book unknown to the ledger or to the catalog.
    #[error("book '{book_id}' is not registered")]
    UnknownBook { book_id: BookId },

    /// Counters or records disagree. Data corruption or a caller bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Backing store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CirculationError {
    /// True for expected outcomes a caller translates into a user message,
    /// false for internal faults.
    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            CirculationError::InvariantViolation(_) | CirculationError::Storage(_)
        )
    }

    /// Builds an [`CirculationError::InvariantViolation`] and logs it where it
    /// was detected.
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(violation = %msg, "Circulation invariant violated");
        CirculationError::InvariantViolation(msg)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for CirculationError {
    fn from(e: rusqlite::Error) -> Self {
        CirculationError::Storage(e.to_string())
    }
}
