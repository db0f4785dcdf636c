use serde::{Deserialize, Serialize};

use crate::error::CirculationResult;
use crate::types::{
    BookId, Loan, LoanId, LoanView, Reservation, ReservationId, ReservationStatus, Timestamp,
    UserId,
};

/// Which loans to list. Empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanFilter {
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
    /// Matched against the derived view, so `Overdue` works
    pub status: Option<LoanView>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan, now: Timestamp) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == loan.user_id)
            && self.book_id.as_ref().is_none_or(|b| *b == loan.book_id)
            && self.status.is_none_or(|s| s == loan.status_at(now))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
    /// Matched against [`Reservation::status_at`]
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation, now: Timestamp) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == reservation.user_id)
            && self.book_id.as_ref().is_none_or(|b| *b == reservation.book_id)
            && self.status.is_none_or(|s| s == reservation.status_at(now))
    }
}

/// Durable home of loan and reservation records.
///
/// Every method is individually atomic. Multi-record consistency is the
/// coordinator's job: it only calls into the store while holding the
/// affected book's exclusive section.
pub trait CirculationStore: Send + Sync {
    fn insert_loan(&self, loan: &Loan) -> CirculationResult<()>;

    /// Overwrites an existing loan record.
    fn update_loan(&self, loan: &Loan) -> CirculationResult<()>;

    fn get_loan(&self, loan_id: LoanId) -> CirculationResult<Option<Loan>>;

    /// All loans, ordered by id.
    fn list_loans(&self) -> CirculationResult<Vec<Loan>>;

    fn count_open_loans(&self, book_id: &str) -> CirculationResult<u32>;

    fn insert_reservation(&self, reservation: &Reservation) -> CirculationResult<()>;

    fn update_reservation(&self, reservation: &Reservation) -> CirculationResult<()>;

    fn get_reservation(&self, reservation_id: ReservationId)
        -> CirculationResult<Option<Reservation>>;

    /// All reservations, ordered by id.
    fn list_reservations(&self) -> CirculationResult<Vec<Reservation>>;

    /// Reservations for one book still stored as `Queued`.
    fn queued_reservations(&self, book_id: &str) -> CirculationResult<Vec<Reservation>>;

    /// Highest ids ever issued, used to resume the id sequences.
    fn max_loan_id(&self) -> CirculationResult<LoanId>;
    fn max_reservation_id(&self) -> CirculationResult<ReservationId>;
}
