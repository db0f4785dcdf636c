#[cfg(test)]
mod tests {
    use crate::error::CirculationError;
    use crate::reservations::ReservationStateMachine;
    use crate::types::{Reservation, ReservationStatus, MS_PER_DAY};

    const T0: u64 = 5_000_000;

    fn queued(id: u64, requested_at: u64) -> Reservation {
        ReservationStateMachine::create_reservation(id, &format!("user_{}", id), "b1", requested_at, 3)
    }

    #[test]
    fn test_create_sets_window() {
        let r = queued(1, T0);
        assert_eq!(r.status, ReservationStatus::Queued);
        assert_eq!(r.expires_at, T0 + 3 * MS_PER_DAY);
        assert!(!r.notified);
    }

    #[test]
    fn test_cancel_only_from_queued() {
        let mut r = queued(1, T0);
        ReservationStateMachine::cancel(&mut r).unwrap();
        assert_eq!(r.status, ReservationStatus::Cancelled);

        let again = ReservationStateMachine::cancel(&mut r);
        assert!(matches!(
            again,
            Err(CirculationError::NotQueued {
                reservation_id: 1,
                status: ReservationStatus::Cancelled
            })
        ));
    }

    #[test]
    fn test_fulfil_marks_notified() {
        let mut r = queued(1, T0);
        ReservationStateMachine::fulfil(&mut r).unwrap();
        assert_eq!(r.status, ReservationStatus::Fulfilled);
        assert!(r.notified);
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        for terminal in [
            ReservationStatus::Fulfilled,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ] {
            let mut r = queued(1, T0);
            r.status = terminal;

            assert!(ReservationStateMachine::cancel(&mut r).is_err());
            assert!(ReservationStateMachine::fulfil(&mut r).is_err());
            assert!(ReservationStateMachine::sweep_expirations([&mut r], T0 + 10 * MS_PER_DAY).is_empty());
            assert_eq!(r.status, terminal, "{:?} must not change", terminal);
        }
    }

    #[test]
    fn test_sweep_expires_at_window_boundary() {
        let mut rs = vec![queued(1, T0), queued(2, T0 + MS_PER_DAY)];
        let boundary = T0 + 3 * MS_PER_DAY;

        let expired = ReservationStateMachine::sweep_expirations(rs.iter_mut(), boundary - 1);
        assert!(expired.is_empty());

        let expired = ReservationStateMachine::sweep_expirations(rs.iter_mut(), boundary);
        assert_eq!(expired, vec![1]);
        assert_eq!(rs[0].status, ReservationStatus::Expired);
        assert_eq!(rs[1].status, ReservationStatus::Queued);
    }

    #[test]
    fn test_next_in_line_is_fifo_with_id_tiebreak() {
        let mut rs = vec![queued(3, T0 + 5), queued(2, T0), queued(1, T0)];
        rs[2].status = ReservationStatus::Cancelled;

        let head = ReservationStateMachine::next_in_line(&mut rs).unwrap();
        // Sorted: 1 (cancelled), 2, 3
        assert_eq!(rs[head].id, 2);
    }

    #[test]
    fn test_next_in_line_skips_everything_terminal() {
        let mut rs = vec![queued(1, T0)];
        rs[0].status = ReservationStatus::Expired;
        assert_eq!(ReservationStateMachine::next_in_line(&mut rs), None);
    }

    #[test]
    fn test_status_at_derives_expiry() {
        let r = queued(1, T0);
        assert_eq!(r.status_at(r.expires_at - 1), ReservationStatus::Queued);
        assert_eq!(r.status_at(r.expires_at), ReservationStatus::Expired);
        assert_eq!(r.status, ReservationStatus::Queued);
    }
}
