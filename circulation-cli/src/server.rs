use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;

use circulation_core::catalog::StaticCatalog;
use circulation_core::clock::SystemClock;
use circulation_core::coordinator::{LifecycleCoordinator, ReturnReceipt};
use circulation_core::error::{CirculationError, CirculationResult};
use circulation_core::infrastructure::CirculationStore;
use circulation_core::infrastructure_in_memory::InMemoryCirculationStore;
use circulation_core::policy::CirculationPolicy;
use circulation_core::types::{Availability, Loan, LoanId, Reservation, ReservationId};

use crate::handlers::*;

pub type AppState = Arc<LifecycleCoordinator>;

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub storage: String,
    pub catalog: Option<String>,
    pub sweep_interval: u64,
    pub max_concurrent_requests: usize,
    pub policy: CirculationPolicy,
}

pub async fn run(options: ServeOptions) -> Result<(), String> {
    let catalog = load_catalog(options.catalog.as_deref())?;
    let store = create_store(&options.storage);

    let coordinator = LifecycleCoordinator::new(
        store,
        Arc::new(catalog.clone()),
        Arc::new(SystemClock),
        options.policy,
    )
    .map_err(|e| format!("Failed to start coordinator: {}", e))?;

    let state: AppState = Arc::new(coordinator);

    for book_id in catalog.book_ids() {
        let id = book_id.clone();
        if let Err(e) = blocking(&state, move |c| c.sync_book(&id)).await {
            tracing::error!(book_id = %book_id, error = %e, "Failed to sync book");
        }
    }

    if options.sweep_interval > 0 {
        tokio::spawn(sweep_loop(
            state.clone(),
            Duration::from_secs(options.sweep_interval),
        ));
    }

    let app = Router::new()
        .route("/health", get(health))
        .route("/books", get(list_books))
        .route("/books/{id}", get(get_book))
        .route("/books/{id}/sync", post(sync_book))
        .route("/loans", post(borrow).get(list_loans))
        .route("/loans/{id}", get(get_loan))
        .route("/loans/{id}/return", post(return_loan))
        .route("/reservations", post(reserve).get(list_reservations))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/cancel", post(cancel_reservation))
        .route("/sweep", post(sweep))
        .layer(GlobalConcurrencyLimitLayer::new(options.max_concurrent_requests))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", options.host, options.port);

    tracing::info!(
        loan_period_days = options.policy.loan_period_days,
        daily_fine_cents = options.policy.daily_fine_cents,
        reservation_window_days = options.policy.reservation_window_days,
        "📚 Circulation server starting on http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))
}

// ─── Error Mapping ──────────────────────────────────────────────────────────

fn status_for(error: &CirculationError) -> StatusCode {
    match error {
        CirculationError::NoCopyAvailable { .. }
        | CirculationError::AlreadyReturned { .. }
        | CirculationError::NotQueued { .. } => StatusCode::CONFLICT,
        CirculationError::LoanNotFound { .. }
        | CirculationError::ReservationNotFound { .. }
        | CirculationError::UnknownBook { .. } => StatusCode::NOT_FOUND,
        CirculationError::InvariantViolation(_) | CirculationError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn reply<T: Serialize>(success: StatusCode, result: CirculationResult<T>) -> Reply<T> {
    match result {
        Ok(data) => (success, Json(ApiResponse::ok(data))),
        Err(e) => {
            if !e.is_business_rule() {
                tracing::error!(error = %e, "Internal circulation failure");
            }
            (status_for(&e), Json(ApiResponse::err(e.to_string())))
        }
    }
}

fn bad_request<T: Serialize>(msg: String) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err(msg)))
}

/// Runs a coordinator call on the blocking pool. Calls wait on per-book
/// mutexes and on storage I/O, which must stay off the runtime workers.
async fn blocking<T, F>(state: &AppState, op: F) -> CirculationResult<T>
where
    F: FnOnce(&LifecycleCoordinator) -> CirculationResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || op(&state))
        .await
        .unwrap_or_else(|e| {
            Err(CirculationError::InvariantViolation(format!(
                "coordinator task failed: {}",
                e
            )))
        })
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Reply<HealthResponse> {
    let result = blocking(&state, |c| c.health()).await.map(|h| HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        books: h.books,
        open_loans: h.open_loans,
        queued_reservations: h.queued_reservations,
    });
    reply(StatusCode::OK, result)
}

async fn list_books(State(state): State<AppState>) -> Reply<Vec<Availability>> {
    reply(StatusCode::OK, Ok(state.books()))
}

async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> Reply<Availability> {
    reply(StatusCode::OK, state.availability(&id))
}

async fn sync_book(State(state): State<AppState>, Path(id): Path<String>) -> Reply<Availability> {
    reply(StatusCode::OK, blocking(&state, move |c| c.sync_book(&id)).await)
}

async fn borrow(State(state): State<AppState>, Json(req): Json<BorrowRequest>) -> Reply<Loan> {
    if let Err(e) = req.validate() {
        return bad_request(e);
    }
    let result = blocking(&state, move |c| c.borrow(&req.user_id, &req.book_id)).await;
    reply(StatusCode::CREATED, result)
}

async fn list_loans(
    State(state): State<AppState>,
    Query(query): Query<LoanQuery>,
) -> Reply<Vec<Loan>> {
    match query.into_filter() {
        Ok(filter) => reply(
            StatusCode::OK,
            blocking(&state, move |c| c.list_loans(&filter)).await,
        ),
        Err(e) => bad_request(e),
    }
}

async fn get_loan(State(state): State<AppState>, Path(id): Path<LoanId>) -> Reply<Loan> {
    reply(StatusCode::OK, blocking(&state, move |c| c.loan(id)).await)
}

async fn return_loan(
    State(state): State<AppState>,
    Path(id): Path<LoanId>,
) -> Reply<ReturnReceipt> {
    let result = blocking(&state, move |c| c.return_loan(id, c.now())).await;
    reply(StatusCode::OK, result)
}

async fn reserve(
    State(state): State<AppState>,
    Json(req): Json<ReserveRequest>,
) -> Reply<Reservation> {
    if let Err(e) = req.validate() {
        return bad_request(e);
    }
    let result = blocking(&state, move |c| c.reserve(&req.user_id, &req.book_id)).await;
    reply(StatusCode::CREATED, result)
}

async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<ReservationQuery>,
) -> Reply<Vec<Reservation>> {
    match query.into_filter() {
        Ok(filter) => reply(
            StatusCode::OK,
            blocking(&state, move |c| c.list_reservations(&filter)).await,
        ),
        Err(e) => bad_request(e),
    }
}

async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> Reply<Reservation> {
    reply(StatusCode::OK, blocking(&state, move |c| c.reservation(id)).await)
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> Reply<Reservation> {
    reply(StatusCode::OK, blocking(&state, move |c| c.cancel_reservation(id)).await)
}

async fn sweep(State(state): State<AppState>) -> Reply<SweepResponse> {
    let result = blocking(&state, |c| c.sweep_all()).await.map(|reservations| SweepResponse {
        expired: reservations.len(),
        reservations,
    });
    reply(StatusCode::OK, result)
}

// ─── Background Sweep ───────────────────────────────────────────────────────

/// Keeps stored reservation state fresh and surfaces holders to notify.
/// Returns enforce expiry inline, so a stalled sweep only delays notices.
async fn sweep_loop(state: AppState, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match blocking(&state, |c| c.sweep_all()).await {
            Ok(expired) => {
                for r in &expired {
                    tracing::info!(
                        reservation_id = r.id,
                        user_id = %r.user_id,
                        book_id = %r.book_id,
                        "Reservation expired, holder to be notified"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
        }
    }
}

// ─── Catalog & Storage Selection ────────────────────────────────────────────

fn load_catalog(path: Option<&str>) -> Result<StaticCatalog, String> {
    let Some(path) = path else {
        tracing::warn!("No catalog file given, using the demo catalog");
        return Ok(StaticCatalog::new()
            .with_book("1", 8)
            .with_book("2", 5)
            .with_book("3", 10));
    };

    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read catalog '{}': {}", path, e))?;
    let catalog = StaticCatalog::from_json(&json).map_err(|e| e.to_string())?;
    tracing::info!("📖 Catalog loaded from {} ({} books)", path, catalog.book_ids().len());
    Ok(catalog)
}

fn create_store(storage: &str) -> Box<dyn CirculationStore> {
    if storage == "memory" {
        tracing::info!("💾 Storage backend: in-memory (history will not persist)");
        Box::new(InMemoryCirculationStore::new())
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("💾 Storage backend: SQLite ({})", path);
            match circulation_core::infrastructure_sqlite::SqliteCirculationStore::open(path) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    tracing::error!("Failed to open SQLite: {}. Falling back to in-memory.", e);
                    Box::new(InMemoryCirculationStore::new())
                }
            }
        }
        #[cfg(not(feature = "sqlite"))]
        {
            tracing::error!(
                "SQLite storage requested but `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
            );
            tracing::warn!("Falling back to in-memory storage.");
            let _ = path;
            Box::new(InMemoryCirculationStore::new())
        }
    } else {
        tracing::error!(
            "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'", storage
        );
        tracing::warn!("Falling back to in-memory storage.");
        Box::new(InMemoryCirculationStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circulation_core::types::ReservationStatus;

    #[test]
    fn test_business_errors_map_to_client_statuses() {
        let no_copy = CirculationError::NoCopyAvailable {
            book_id: "b1".into(),
        };
        let not_queued = CirculationError::NotQueued {
            reservation_id: 1,
            status: ReservationStatus::Fulfilled,
        };
        assert_eq!(status_for(&no_copy), StatusCode::CONFLICT);
        assert_eq!(status_for(&not_queued), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&CirculationError::LoanNotFound { loan_id: 3 }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_invariant_violation_is_internal() {
        let (status, Json(body)) = reply::<()>(
            StatusCode::OK,
            Err(CirculationError::InvariantViolation("counter drift".into())),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.success);
        assert!(body.error.unwrap().contains("counter drift"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_call_does_not_stall_other_books() {
        let catalog = StaticCatalog::new().with_book("b1", 1).with_book("b2", 1);
        let state: AppState = Arc::new(
            LifecycleCoordinator::new(
                Box::new(InMemoryCirculationStore::new()),
                Arc::new(catalog),
                Arc::new(SystemClock),
                CirculationPolicy::default(),
            )
            .unwrap(),
        );

        let (started, running) = tokio::sync::oneshot::channel::<()>();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let slow = tokio::spawn({
            let state = state.clone();
            async move {
                blocking(&state, move |c| {
                    started.send(()).ok();
                    gate.recv().ok();
                    c.borrow("alice", "b1")
                })
                .await
            }
        });

        // Single runtime thread: the slow call is parked mid-flight, so both
        // of these only complete if it runs on the blocking pool.
        running.await.unwrap();
        let loan = blocking(&state, |c| c.borrow("bob", "b2")).await.unwrap();
        assert_eq!(loan.book_id, "b2");

        release.send(()).unwrap();
        let first = slow.await.unwrap().unwrap();
        assert_eq!(first.book_id, "b1");
    }

    #[test]
    fn test_demo_catalog_without_file() {
        let catalog = load_catalog(None).unwrap();
        assert_eq!(catalog.book_ids(), vec!["1", "2", "3"]);
    }
}
