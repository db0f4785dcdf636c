//! Cross-entity transitions and the per-book concurrency discipline.
//!
//! Every operation that touches a book runs inside that book's exclusive
//! section. Sections are independent, so traffic on one title never waits on
//! another. A returned copy passes straight to the next reservation inside
//! the section and never shows up as available in between.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::error::{CirculationError, CirculationResult};
use crate::infrastructure::{CirculationStore, LoanFilter, ReservationFilter};
use crate::ledger::AvailabilityLedger;
use crate::loans::LoanStateMachine;
use crate::policy::CirculationPolicy;
use crate::reservations::ReservationStateMachine;
use crate::types::*;

/// One mutex per book, created on first use and never removed. Entries are
/// only created for catalog books or books already on record, so the table
/// is bounded by the catalog.
#[derive(Debug, Default)]
struct BookLocks {
    sections: RwLock<HashMap<BookId, Arc<Mutex<()>>>>,
}

impl BookLocks {
    fn section(&self, book_id: &str) -> Arc<Mutex<()>> {
        if let Some(section) = self.sections.read().get(book_id) {
            return section.clone();
        }
        self.sections
            .write()
            .entry(book_id.to_string())
            .or_default()
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sections.read().len()
    }
}

/// Outcome of a successful return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnReceipt {
    /// The closed loan
    pub loan: Loan,
    /// Fine charged, in cents
    pub fine: u64,
    /// Loan opened for the next reservation holder, if the copy went to one
    pub promoted: Option<Loan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub books: usize,
    pub open_loans: usize,
    pub queued_reservations: usize,
}

pub struct LifecycleCoordinator {
    ledger: AvailabilityLedger,
    store: Box<dyn CirculationStore>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    policy: CirculationPolicy,
    locks: BookLocks,
    last_loan_id: AtomicU64,
    last_reservation_id: AtomicU64,
}

impl LifecycleCoordinator {
    /// Builds a coordinator over an existing store, resuming its id
    /// sequences. Books join the ledger lazily, or eagerly via
    /// [`Self::sync_book`].
    pub fn new(
        store: Box<dyn CirculationStore>,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        policy: CirculationPolicy,
    ) -> CirculationResult<Self> {
        let last_loan_id = store.max_loan_id()?;
        let last_reservation_id = store.max_reservation_id()?;

        Ok(Self {
            ledger: AvailabilityLedger::new(),
            store,
            catalog,
            clock,
            policy,
            locks: BookLocks::default(),
            last_loan_id: AtomicU64::new(last_loan_id),
            last_reservation_id: AtomicU64::new(last_reservation_id),
        })
    }

    pub fn policy(&self) -> &CirculationPolicy {
        &self.policy
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn next_loan_id(&self) -> LoanId {
        self.last_loan_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_reservation_id(&self) -> ReservationId {
        self.last_reservation_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Section for a book the ledger or the catalog knows about. Unknown ids
    /// fail before a lock entry is created for them.
    fn known_section(&self, book_id: &str) -> CirculationResult<Arc<Mutex<()>>> {
        if !self.ledger.is_registered(book_id) && self.catalog.total_copies(book_id)?.is_none() {
            return Err(CirculationError::UnknownBook {
                book_id: book_id.to_string(),
            });
        }
        Ok(self.locks.section(book_id))
    }

    #[cfg(test)]
    pub(crate) fn section_count(&self) -> usize {
        self.locks.len()
    }

    // ─── Books ──────────────────────────────────────────────────────────────

    /// Re-reads the book's total from the catalog and rebuilds its counters
    /// from the open loans on record.
    pub fn sync_book(&self, book_id: &str) -> CirculationResult<Availability> {
        let section = self.known_section(book_id)?;
        let _guard = section.lock();
        self.sync_book_locked(book_id)
    }

    fn sync_book_locked(&self, book_id: &str) -> CirculationResult<Availability> {
        let total = self
            .catalog
            .total_copies(book_id)?
            .ok_or_else(|| CirculationError::UnknownBook {
                book_id: book_id.to_string(),
            })?;
        let on_loan = self.store.count_open_loans(book_id)?;
        let availability = self.ledger.register_book(book_id, total, on_loan)?;

        tracing::info!(
            book_id,
            total_copies = availability.total_copies,
            available_copies = availability.available_copies,
            "Book synced from catalog"
        );
        Ok(availability)
    }

    fn ensure_registered(&self, book_id: &str) -> CirculationResult<()> {
        if !self.ledger.is_registered(book_id) {
            self.sync_book_locked(book_id)?;
        }
        Ok(())
    }

    pub fn availability(&self, book_id: &str) -> CirculationResult<Availability> {
        self.ledger
            .availability(book_id)
            .ok_or_else(|| CirculationError::UnknownBook {
                book_id: book_id.to_string(),
            })
    }

    pub fn books(&self) -> Vec<Availability> {
        self.ledger.books()
    }

    // ─── Loans ──────────────────────────────────────────────────────────────

    pub fn borrow(&self, user_id: &str, book_id: &str) -> CirculationResult<Loan> {
        let section = self.known_section(book_id)?;
        let _guard = section.lock();

        self.ensure_registered(book_id)?;
        let now = self.clock.now();

        let loan = LoanStateMachine::open_loan(
            &self.ledger,
            || self.next_loan_id(),
            user_id,
            book_id,
            self.policy.loan_period_days,
            now,
        )
        .inspect_err(|_| tracing::info!(user_id, book_id, "Borrow refused: no copy available"))?;

        if let Err(e) = self.store.insert_loan(&loan) {
            self.ledger.release_copy(book_id)?;
            return Err(e);
        }

        tracing::info!(
            loan_id = loan.id,
            user_id,
            book_id,
            due_at = loan.due_at,
            "Loan opened"
        );
        Ok(loan)
    }

    /// Closes a loan and hands its copy on: to the head of the book's
    /// reservation queue if anyone is still waiting, otherwise back to the
    /// ledger.
    ///
    /// Everything is read and decided before the first write. Once the loan
    /// is stored as returned the copy always lands somewhere: a promotion
    /// that fails to persist is rolled back and the copy is released.
    pub fn return_loan(
        &self,
        loan_id: LoanId,
        returned_at: Timestamp,
    ) -> CirculationResult<ReturnReceipt> {
        let book_id = self.loan(loan_id)?.book_id;

        let section = self.locks.section(&book_id);
        let _guard = section.lock();

        // Re-read under the section: a concurrent return may have won.
        let mut loan = self.loan(loan_id)?;
        self.ensure_registered(&book_id)?;

        let fine =
            LoanStateMachine::close_loan(&mut loan, returned_at, self.policy.daily_fine_cents)?;

        let handover_at = self.clock.now().max(returned_at);
        let mut queued = self.store.queued_reservations(&book_id)?;
        let expired = ReservationStateMachine::sweep_expirations(queued.iter_mut(), handover_at);

        self.store.update_loan(&loan)?;

        tracing::info!(
            loan_id,
            user_id = %loan.user_id,
            book_id = %book_id,
            fine,
            "Loan returned"
        );

        // Stored rows left Queued still read as Expired, see
        // `Reservation::status_at`, so a failed write here only delays it.
        if let Err(e) = self.write_expired(&queued, &expired) {
            tracing::warn!(
                book_id = %book_id,
                error = %e,
                "Could not persist expired reservations"
            );
        }

        let promoted = self.hand_over_copy(&book_id, &mut queued, handover_at)?;

        Ok(ReturnReceipt {
            loan,
            fine,
            promoted,
        })
    }

    /// Gives the returned copy to the next live reservation in `queued`, or
    /// back to the ledger. Must be called with the book's section held.
    fn hand_over_copy(
        &self,
        book_id: &str,
        queued: &mut [Reservation],
        now: Timestamp,
    ) -> CirculationResult<Option<Loan>> {
        let Some(next) = ReservationStateMachine::next_in_line(queued) else {
            self.ledger.release_copy(book_id)?;
            tracing::debug!(book_id, "Copy released to general availability");
            return Ok(None);
        };

        let reservation = &mut queued[next];
        let reservation_id = reservation.id;
        let loan = match self.promote(reservation, now) {
            Ok(loan) => loan,
            Err(e) => {
                tracing::error!(
                    reservation_id,
                    book_id,
                    error = %e,
                    "Promotion failed, releasing copy instead"
                );
                self.ledger.release_copy(book_id)?;
                return Ok(None);
            }
        };

        tracing::info!(
            reservation_id,
            loan_id = loan.id,
            user_id = %loan.user_id,
            book_id,
            "Reservation fulfilled with returned copy"
        );
        Ok(Some(loan))
    }

    fn promote(&self, reservation: &mut Reservation, now: Timestamp) -> CirculationResult<Loan> {
        let waiting = reservation.clone();
        ReservationStateMachine::fulfil(reservation)?;
        let loan = LoanStateMachine::transfer_loan(
            self.next_loan_id(),
            reservation,
            self.policy.loan_period_days,
            now,
        );
        self.commit_promotion(reservation, &waiting, &loan)?;
        Ok(loan)
    }

    /// Stores a fulfilled reservation and its loan together, restoring
    /// `waiting` if the loan cannot be written.
    fn commit_promotion(
        &self,
        fulfilled: &Reservation,
        waiting: &Reservation,
        loan: &Loan,
    ) -> CirculationResult<()> {
        self.store.update_reservation(fulfilled)?;
        if let Err(e) = self.store.insert_loan(loan) {
            if let Err(undo) = self.store.update_reservation(waiting) {
                return Err(CirculationError::invariant(format!(
                    "reservation {} left fulfilled without a loan: {}; undo failed: {}",
                    fulfilled.id, e, undo
                )));
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn loan(&self, loan_id: LoanId) -> CirculationResult<Loan> {
        self.store
            .get_loan(loan_id)?
            .ok_or(CirculationError::LoanNotFound { loan_id })
    }

    pub fn list_loans(&self, filter: &LoanFilter) -> CirculationResult<Vec<Loan>> {
        let now = self.clock.now();
        let mut loans = self.store.list_loans()?;
        loans.retain(|l| filter.matches(l, now));
        Ok(loans)
    }

    // ─── Reservations ───────────────────────────────────────────────────────

    /// Queues the user for the book. Never consults availability, but the
    /// book must be known to the catalog.
    pub fn reserve(&self, user_id: &str, book_id: &str) -> CirculationResult<Reservation> {
        let section = self.known_section(book_id)?;
        let _guard = section.lock();

        let reservation = ReservationStateMachine::create_reservation(
            self.next_reservation_id(),
            user_id,
            book_id,
            self.clock.now(),
            self.policy.reservation_window_days,
        );
        self.store.insert_reservation(&reservation)?;

        tracing::info!(
            reservation_id = reservation.id,
            user_id,
            book_id,
            expires_at = reservation.expires_at,
            "Reservation queued"
        );
        Ok(reservation)
    }

    pub fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> CirculationResult<Reservation> {
        let book_id = self.reservation(reservation_id)?.book_id;

        let section = self.locks.section(&book_id);
        let _guard = section.lock();

        let mut reservation = self.reservation(reservation_id)?;
        // A lapsed window is recorded first so the refusal below reports it.
        self.persist_expired(std::slice::from_mut(&mut reservation), self.clock.now())?;

        ReservationStateMachine::cancel(&mut reservation)?;
        self.store.update_reservation(&reservation)?;

        tracing::info!(reservation_id, book_id = %book_id, "Reservation cancelled");
        Ok(reservation)
    }

    pub fn reservation(&self, reservation_id: ReservationId) -> CirculationResult<Reservation> {
        self.store
            .get_reservation(reservation_id)?
            .ok_or(CirculationError::ReservationNotFound { reservation_id })
    }

    pub fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> CirculationResult<Vec<Reservation>> {
        let now = self.clock.now();
        let mut reservations = self.store.list_reservations()?;
        reservations.retain(|r| filter.matches(r, now));
        Ok(reservations)
    }

    /// Expires every lapsed reservation across all books, one section at a
    /// time, and returns them so callers can notify the holders. Returns
    /// enforce expiry on their own; this only keeps stored state fresh.
    pub fn sweep_all(&self) -> CirculationResult<Vec<Reservation>> {
        let now = self.clock.now();
        let books: BTreeSet<BookId> = self
            .store
            .list_reservations()?
            .into_iter()
            .filter(|r| r.status == ReservationStatus::Queued && r.expires_at <= now)
            .map(|r| r.book_id)
            .collect();

        let mut expired = Vec::new();
        for book_id in books {
            let section = self.locks.section(&book_id);
            let _guard = section.lock();

            let mut queued = self.store.queued_reservations(&book_id)?;
            let ids = self.persist_expired(&mut queued, now)?;
            expired.extend(queued.into_iter().filter(|r| ids.contains(&r.id)));
        }

        if !expired.is_empty() {
            tracing::info!(expired = expired.len(), "Expired reservations swept");
        }
        Ok(expired)
    }

    /// Runs the expiry sweep over `reservations` and writes back the ones
    /// that changed. Caller holds the book's section.
    fn persist_expired(
        &self,
        reservations: &mut [Reservation],
        now: Timestamp,
    ) -> CirculationResult<Vec<ReservationId>> {
        let ids = ReservationStateMachine::sweep_expirations(reservations.iter_mut(), now);
        self.write_expired(reservations, &ids)?;
        Ok(ids)
    }

    fn write_expired(
        &self,
        reservations: &[Reservation],
        ids: &[ReservationId],
    ) -> CirculationResult<()> {
        for reservation in reservations.iter().filter(|r| ids.contains(&r.id)) {
            self.store.update_reservation(reservation)?;
            tracing::info!(
                reservation_id = reservation.id,
                user_id = %reservation.user_id,
                book_id = %reservation.book_id,
                "Reservation expired"
            );
        }
        Ok(())
    }

    pub fn health(&self) -> CirculationResult<HealthSnapshot> {
        let open_loans = self
            .store
            .list_loans()?
            .iter()
            .filter(|l| l.is_open())
            .count();
        let queued_reservations = self
            .store
            .list_reservations()?
            .iter()
            .filter(|r| r.status == ReservationStatus::Queued)
            .count();

        Ok(HealthSnapshot {
            books: self.ledger.books().len(),
            open_loans,
            queued_reservations,
        })
    }
}
