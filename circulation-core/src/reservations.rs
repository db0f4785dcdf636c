use crate::error::{CirculationError, CirculationResult};
use crate::types::{Reservation, ReservationId, ReservationStatus, Timestamp, days};

/// Transitions of a single reservation: Queued -> Fulfilled | Cancelled |
/// Expired. Terminal states never change again.
pub struct ReservationStateMachine;

impl ReservationStateMachine {
    /// Always succeeds: reservations queue whatever the current availability.
    pub fn create_reservation(
        id: ReservationId,
        user_id: &str,
        book_id: &str,
        now: Timestamp,
        window_days: u32,
    ) -> Reservation {
        Reservation::new(
            id,
            user_id.to_string(),
            book_id.to_string(),
            now,
            days(window_days),
        )
    }

    pub fn cancel(reservation: &mut Reservation) -> CirculationResult<()> {
        Self::leave_queue(reservation, ReservationStatus::Cancelled)
    }

    /// Hands the next free copy to this reservation. The holder is considered
    /// notified from this point.
    pub fn fulfil(reservation: &mut Reservation) -> CirculationResult<()> {
        Self::leave_queue(reservation, ReservationStatus::Fulfilled)?;
        reservation.notified = true;
        Ok(())
    }

    /// Expires every queued reservation whose window has closed by `now`.
    /// Returns the ones it changed; non-queued entries are left alone.
    pub fn sweep_expirations<'a>(
        reservations: impl IntoIterator<Item = &'a mut Reservation>,
        now: Timestamp,
    ) -> Vec<ReservationId> {
        reservations
            .into_iter()
            .filter(|r| r.status == ReservationStatus::Queued && r.expires_at <= now)
            .map(|r| {
                r.status = ReservationStatus::Expired;
                r.id
            })
            .collect()
    }

    /// Sorts a book's reservations into service order and returns the index of
    /// the earliest still-queued one.
    pub fn next_in_line(reservations: &mut [Reservation]) -> Option<usize> {
        reservations.sort_by_key(Reservation::queue_key);
        reservations
            .iter()
            .position(|r| r.status == ReservationStatus::Queued)
    }

    fn leave_queue(
        reservation: &mut Reservation,
        to: ReservationStatus,
    ) -> CirculationResult<()> {
        if reservation.status != ReservationStatus::Queued {
            return Err(CirculationError::NotQueued {
                reservation_id: reservation.id,
                status: reservation.status,
            });
        }
        reservation.status = to;
        Ok(())
    }
}
