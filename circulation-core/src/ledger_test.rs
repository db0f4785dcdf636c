#[cfg(test)]
mod tests {
    use crate::error::CirculationError;
    use crate::ledger::AvailabilityLedger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_derives_available_from_open_loans() {
        let ledger = AvailabilityLedger::new();
        let snapshot = ledger.register_book("b1", 8, 3).unwrap();

        assert_eq!(snapshot.total_copies, 8);
        assert_eq!(snapshot.available_copies, 5);
        assert_eq!(ledger.availability("b1"), Some(snapshot));
    }

    #[test]
    fn test_register_rejects_more_loans_than_copies() {
        let ledger = AvailabilityLedger::new();
        let result = ledger.register_book("b1", 2, 3);

        assert!(matches!(result, Err(CirculationError::InvariantViolation(_))));
        assert!(!ledger.is_registered("b1"));
    }

    #[test]
    fn test_try_reserve_stops_at_zero() {
        let ledger = AvailabilityLedger::new();
        ledger.register_book("b1", 2, 0).unwrap();

        assert!(ledger.try_reserve_copy("b1"));
        assert!(ledger.try_reserve_copy("b1"));
        assert!(!ledger.try_reserve_copy("b1"));
        assert_eq!(ledger.availability("b1").unwrap().available_copies, 0);
    }

    #[test]
    fn test_try_reserve_unknown_book_is_refused() {
        let ledger = AvailabilityLedger::new();
        assert!(!ledger.try_reserve_copy("ghost"));
    }

    #[test]
    fn test_release_beyond_total_is_reported_not_clamped() {
        let ledger = AvailabilityLedger::new();
        ledger.register_book("b1", 1, 0).unwrap();

        let result = ledger.release_copy("b1");
        assert!(matches!(result, Err(CirculationError::InvariantViolation(_))));
        assert_eq!(ledger.availability("b1").unwrap().available_copies, 1);
    }

    #[test]
    fn test_release_after_reserve_restores_copy() {
        let ledger = AvailabilityLedger::new();
        ledger.register_book("b1", 1, 0).unwrap();

        assert!(ledger.try_reserve_copy("b1"));
        ledger.release_copy("b1").unwrap();
        assert_eq!(ledger.availability("b1").unwrap().available_copies, 1);
    }

    #[test]
    fn test_books_are_independent() {
        let ledger = AvailabilityLedger::new();
        ledger.register_book("a", 1, 0).unwrap();
        ledger.register_book("b", 1, 0).unwrap();

        assert!(ledger.try_reserve_copy("a"));
        assert!(ledger.try_reserve_copy("b"));

        let books = ledger.books();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].book_id, "a");
        assert!(books.iter().all(|b| b.available_copies == 0));
    }

    #[test]
    fn test_concurrent_reserves_never_overdraw() {
        let ledger = AvailabilityLedger::new();
        ledger.register_book("b1", 10, 0).unwrap();
        let granted = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..32 {
                s.spawn(|| {
                    for _ in 0..4 {
                        if ledger.try_reserve_copy("b1") {
                            granted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(granted.load(Ordering::SeqCst), 10);
        assert_eq!(ledger.availability("b1").unwrap().available_copies, 0);
    }
}
