use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::{CirculationError, CirculationResult};
use crate::infrastructure::CirculationStore;
use crate::types::{Loan, LoanId, Reservation, ReservationId, ReservationStatus};

/// Process-local store. Records vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryCirculationStore {
    // Loan ID -> Loan
    loans: Mutex<BTreeMap<LoanId, Loan>>,
    // Reservation ID -> Reservation
    reservations: Mutex<BTreeMap<ReservationId, Reservation>>,
}

impl InMemoryCirculationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CirculationStore for InMemoryCirculationStore {
    fn insert_loan(&self, loan: &Loan) -> CirculationResult<()> {
        let mut loans = self.loans.lock();
        if loans.contains_key(&loan.id) {
            return Err(CirculationError::invariant(format!(
                "loan {} inserted twice",
                loan.id
            )));
        }
        loans.insert(loan.id, loan.clone());
        Ok(())
    }

    fn update_loan(&self, loan: &Loan) -> CirculationResult<()> {
        match self.loans.lock().get_mut(&loan.id) {
            Some(stored) => {
                *stored = loan.clone();
                Ok(())
            }
            None => Err(CirculationError::LoanNotFound { loan_id: loan.id }),
        }
    }

    fn get_loan(&self, loan_id: LoanId) -> CirculationResult<Option<Loan>> {
        Ok(self.loans.lock().get(&loan_id).cloned())
    }

    fn list_loans(&self) -> CirculationResult<Vec<Loan>> {
        Ok(self.loans.lock().values().cloned().collect())
    }

    fn count_open_loans(&self, book_id: &str) -> CirculationResult<u32> {
        let count = self
            .loans
            .lock()
            .values()
            .filter(|l| l.book_id == book_id && l.is_open())
            .count();
        Ok(count as u32)
    }

    fn insert_reservation(&self, reservation: &Reservation) -> CirculationResult<()> {
        let mut reservations = self.reservations.lock();
        if reservations.contains_key(&reservation.id) {
            return Err(CirculationError::invariant(format!(
                "reservation {} inserted twice",
                reservation.id
            )));
        }
        reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    fn update_reservation(&self, reservation: &Reservation) -> CirculationResult<()> {
        match self.reservations.lock().get_mut(&reservation.id) {
            Some(stored) => {
                *stored = reservation.clone();
                Ok(())
            }
            None => Err(CirculationError::ReservationNotFound {
                reservation_id: reservation.id,
            }),
        }
    }

    fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> CirculationResult<Option<Reservation>> {
        Ok(self.reservations.lock().get(&reservation_id).cloned())
    }

    fn list_reservations(&self) -> CirculationResult<Vec<Reservation>> {
        Ok(self.reservations.lock().values().cloned().collect())
    }

    fn queued_reservations(&self, book_id: &str) -> CirculationResult<Vec<Reservation>> {
        Ok(self
            .reservations
            .lock()
            .values()
            .filter(|r| r.book_id == book_id && r.status == ReservationStatus::Queued)
            .cloned()
            .collect())
    }

    fn max_loan_id(&self) -> CirculationResult<LoanId> {
        Ok(self.loans.lock().keys().next_back().copied().unwrap_or(0))
    }

    fn max_reservation_id(&self) -> CirculationResult<ReservationId> {
        Ok(self
            .reservations
            .lock()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }
}
