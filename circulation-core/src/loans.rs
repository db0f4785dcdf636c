use crate::error::{CirculationError, CirculationResult};
use crate::ledger::AvailabilityLedger;
use crate::types::{days, Loan, LoanId, LoanStatus, Reservation, Timestamp, MS_PER_DAY};

/// Transitions of a single loan: Open -> Returned. Overdue is a read-time
/// view ([`Loan::status_at`]), never a transition.
pub struct LoanStateMachine;

impl LoanStateMachine {
    /// Opens a loan by taking a copy from the ledger. `next_id` is only
    /// called once the copy is secured, so a refused borrow burns no id.
    pub fn open_loan(
        ledger: &AvailabilityLedger,
        next_id: impl FnOnce() -> LoanId,
        user_id: &str,
        book_id: &str,
        loan_period_days: u32,
        now: Timestamp,
    ) -> CirculationResult<Loan> {
        if !ledger.try_reserve_copy(book_id) {
            return Err(CirculationError::NoCopyAvailable {
                book_id: book_id.to_string(),
            });
        }

        Ok(Loan::new(
            next_id(),
            user_id.to_string(),
            book_id.to_string(),
            now,
            days(loan_period_days),
        ))
    }

    /// Opens a loan for a promoted reservation on a copy that never went back
    /// to the ledger.
    pub fn transfer_loan(
        id: LoanId,
        reservation: &Reservation,
        loan_period_days: u32,
        now: Timestamp,
    ) -> Loan {
        let mut loan = Loan::new(
            id,
            reservation.user_id.clone(),
            reservation.book_id.clone(),
            now,
            days(loan_period_days),
        );
        loan.fulfilled_reservation = Some(reservation.id);
        loan
    }

    /// Marks the loan returned and fixes its fine. Returns the fine.
    pub fn close_loan(
        loan: &mut Loan,
        returned_at: Timestamp,
        daily_fine_cents: u64,
    ) -> CirculationResult<u64> {
        if loan.status == LoanStatus::Returned {
            return Err(CirculationError::AlreadyReturned { loan_id: loan.id });
        }

        let fine = Self::fine_for(loan.due_at, returned_at, daily_fine_cents);
        loan.status = LoanStatus::Returned;
        loan.closed_at = Some(returned_at);
        loan.fine_amount = fine;
        Ok(fine)
    }

    /// Whole overdue days times the daily rate. Partial days are dropped and
    /// on-time returns cost nothing.
    pub fn fine_for(due_at: Timestamp, returned_at: Timestamp, daily_fine_cents: u64) -> u64 {
        let days_overdue = returned_at.saturating_sub(due_at) / MS_PER_DAY;
        days_overdue.saturating_mul(daily_fine_cents)
    }
}
