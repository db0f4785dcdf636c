use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use circulation_core::catalog::StaticCatalog;
use circulation_core::clock::ManualClock;
use circulation_core::coordinator::LifecycleCoordinator;
use circulation_core::infrastructure_in_memory::InMemoryCirculationStore;
use circulation_core::ledger::AvailabilityLedger;
use circulation_core::policy::CirculationPolicy;
use circulation_core::types::MS_PER_DAY;

fn setup(books: u32, copies: u32) -> (LifecycleCoordinator, Arc<ManualClock>) {
    let catalog = (0..books).fold(StaticCatalog::new(), |c, i| {
        c.with_book(format!("book-{}", i), copies)
    });
    let clock = Arc::new(ManualClock::new(1_000));
    let coordinator = LifecycleCoordinator::new(
        Box::new(InMemoryCirculationStore::new()),
        Arc::new(catalog),
        clock.clone(),
        CirculationPolicy::default(),
    )
    .unwrap();
    (coordinator, clock)
}

fn bench_ledger_reserve_release(c: &mut Criterion) {
    let ledger = AvailabilityLedger::new();
    ledger.register_book("b1", 1, 0).unwrap();

    c.bench_function("ledger_reserve_release_cycle", |b| {
        b.iter(|| {
            black_box(ledger.try_reserve_copy("b1"));
            ledger.release_copy("b1").unwrap();
        })
    });
}

fn bench_borrow_return(c: &mut Criterion) {
    let (coordinator, _) = setup(1, 1);

    c.bench_function("borrow_return_cycle", |b| {
        b.iter(|| {
            let loan = coordinator.borrow("reader", "book-0").unwrap();
            black_box(coordinator.return_loan(loan.id, loan.opened_at).unwrap())
        })
    });
}

fn bench_promotion_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("promotion_chain");

    for waiting in [10, 100] {
        group.bench_with_input(
            BenchmarkId::new("reservations", waiting),
            &waiting,
            |b, &count| {
                b.iter(|| {
                    let (coordinator, clock) = setup(1, 1);
                    let mut loan = coordinator.borrow("first", "book-0").unwrap();
                    for i in 0..count {
                        coordinator.reserve(&format!("r{}", i), "book-0").unwrap();
                    }
                    for _ in 0..count {
                        clock.advance(MS_PER_DAY / 24);
                        let receipt = coordinator.return_loan(loan.id, coordinator.now()).unwrap();
                        loan = receipt.promoted.unwrap();
                    }
                    black_box(loan.id)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_ledger_reserve_release, bench_borrow_return, bench_promotion_chain);
criterion_main!(benches);
