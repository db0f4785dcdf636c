use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use circulation_core::catalog::StaticCatalog;
use circulation_core::clock::SystemClock;
use circulation_core::coordinator::LifecycleCoordinator;
use circulation_core::infrastructure_in_memory::InMemoryCirculationStore;
use circulation_core::policy::CirculationPolicy;

const THREADS: usize = 8;
const ROUNDS: usize = 100;

/// Eight threads borrowing and returning, spread over `books` titles.
/// One title means every thread fights for the same section.
fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("borrow_return_contention");

    for books in [1usize, THREADS] {
        group.bench_with_input(BenchmarkId::new("books", books), &books, |b, &books| {
            let catalog = (0..books).fold(StaticCatalog::new(), |c, i| {
                c.with_book(format!("book-{}", i), 2)
            });
            let coordinator = LifecycleCoordinator::new(
                Box::new(InMemoryCirculationStore::new()),
                Arc::new(catalog),
                Arc::new(SystemClock),
                CirculationPolicy::default(),
            )
            .unwrap();

            b.iter(|| {
                std::thread::scope(|s| {
                    for t in 0..THREADS {
                        let coordinator = &coordinator;
                        s.spawn(move || {
                            let book = format!("book-{}", t % books);
                            for _ in 0..ROUNDS {
                                if let Ok(loan) = coordinator.borrow("reader", &book) {
                                    black_box(coordinator.return_loan(loan.id, coordinator.now()).ok());
                                }
                            }
                        });
                    }
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_contention);
criterion_main!(benches);
