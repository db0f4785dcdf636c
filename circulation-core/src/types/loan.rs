use serde::{Deserialize, Serialize};

use super::{BookId, LoanId, ReservationId, Timestamp, UserId};

/// Stored loan states. Overdue is never stored, see [`LoanView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Copy is with the borrower
    Open,
    /// Copy came back; terminal
    Returned,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Open => "Open",
            LoanStatus::Returned => "Returned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Open" => Some(LoanStatus::Open),
            "Returned" => Some(LoanStatus::Returned),
            _ => None,
        }
    }
}

/// Status as seen at a given instant, with Overdue derived from `due_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanView {
    Open,
    Overdue,
    Returned,
}

/// One borrowing of one copy. Append-only: closed loans are kept as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub opened_at: Timestamp,
    pub due_at: Timestamp,
    /// Set once, when the copy is returned
    pub closed_at: Option<Timestamp>,
    pub status: LoanStatus,
    /// Fine in cents, fixed at close time
    pub fine_amount: u64,
    /// Reservation this loan was promoted from, if any
    pub fulfilled_reservation: Option<ReservationId>,
}

impl Loan {
    pub fn new(
        id: LoanId,
        user_id: UserId,
        book_id: BookId,
        opened_at: Timestamp,
        period_ms: u64,
    ) -> Self {
        Self {
            id,
            user_id,
            book_id,
            opened_at,
            due_at: opened_at.saturating_add(period_ms),
            closed_at: None,
            status: LoanStatus::Open,
            fine_amount: 0,
            fulfilled_reservation: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == LoanStatus::Open
    }

    pub fn status_at(&self, now: Timestamp) -> LoanView {
        match self.status {
            LoanStatus::Returned => LoanView::Returned,
            LoanStatus::Open if now > self.due_at => LoanView::Overdue,
            LoanStatus::Open => LoanView::Open,
        }
    }
}
