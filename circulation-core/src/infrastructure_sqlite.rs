//! SQLite-backed CirculationStore implementation.
//! Loan and reservation history survives restarts.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! circulation-core = { path = "../circulation-core", features = ["sqlite"] }
//! ```

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CirculationError, CirculationResult};
use crate::infrastructure::CirculationStore;
use crate::types::*;

const LOAN_COLUMNS: &str = "id, user_id, book_id, opened_at, due_at, closed_at, status, \
                            fine_amount, fulfilled_reservation";

const RESERVATION_COLUMNS: &str =
    "id, user_id, book_id, requested_at, expires_at, status, notified";

/// A persistent circulation store backed by SQLite.
///
/// Uses WAL mode for concurrent read performance. The connection itself is
/// serialized behind a mutex; per-book exclusion lives in the coordinator.
pub struct SqliteCirculationStore {
    conn: Mutex<Connection>,
}

impl SqliteCirculationStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> CirculationResult<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS loans (
                id          INTEGER PRIMARY KEY,
                user_id     TEXT NOT NULL,
                book_id     TEXT NOT NULL,
                opened_at   INTEGER NOT NULL,
                due_at      INTEGER NOT NULL,
                closed_at   INTEGER,
                status      TEXT NOT NULL DEFAULT 'Open',
                fine_amount INTEGER NOT NULL DEFAULT 0,
                fulfilled_reservation INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_loans_book_status ON loans(book_id, status);
            CREATE INDEX IF NOT EXISTS idx_loans_user ON loans(user_id);

            CREATE TABLE IF NOT EXISTS reservations (
                id           INTEGER PRIMARY KEY,
                user_id      TEXT NOT NULL,
                book_id      TEXT NOT NULL,
                requested_at INTEGER NOT NULL,
                expires_at   INTEGER NOT NULL,
                status       TEXT NOT NULL DEFAULT 'Queued',
                notified     INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_reservations_book_status ON reservations(book_id, status);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, handy for tests.
    pub fn open_in_memory() -> CirculationResult<Self> {
        Self::open(":memory:")
    }

    fn row_to_loan(row: &rusqlite::Row) -> rusqlite::Result<Loan> {
        let status_str: String = row.get(6)?;
        let status = LoanStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown loan status '{}'", status_str).into(),
            )
        })?;

        Ok(Loan {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            opened_at: row.get(3)?,
            due_at: row.get(4)?,
            closed_at: row.get(5)?,
            status,
            fine_amount: row.get(7)?,
            fulfilled_reservation: row.get(8)?,
        })
    }

    fn row_to_reservation(row: &rusqlite::Row) -> rusqlite::Result<Reservation> {
        let status_str: String = row.get(5)?;
        let status = ReservationStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("unknown reservation status '{}'", status_str).into(),
            )
        })?;

        Ok(Reservation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            requested_at: row.get(3)?,
            expires_at: row.get(4)?,
            status,
            notified: row.get(6)?,
        })
    }
}

impl CirculationStore for SqliteCirculationStore {
    fn insert_loan(&self, loan: &Loan) -> CirculationResult<()> {
        self.conn.lock().execute(
            &format!(
                "INSERT INTO loans ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                LOAN_COLUMNS
            ),
            params![
                loan.id,
                loan.user_id,
                loan.book_id,
                loan.opened_at,
                loan.due_at,
                loan.closed_at,
                loan.status.as_str(),
                loan.fine_amount,
                loan.fulfilled_reservation,
            ],
        )?;
        Ok(())
    }

    fn update_loan(&self, loan: &Loan) -> CirculationResult<()> {
        let rows = self.conn.lock().execute(
            "UPDATE loans SET closed_at = ?1, status = ?2, fine_amount = ?3 WHERE id = ?4",
            params![loan.closed_at, loan.status.as_str(), loan.fine_amount, loan.id],
        )?;
        if rows == 0 {
            return Err(CirculationError::LoanNotFound { loan_id: loan.id });
        }
        Ok(())
    }

    fn get_loan(&self, loan_id: LoanId) -> CirculationResult<Option<Loan>> {
        let loan = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM loans WHERE id = ?1", LOAN_COLUMNS),
                params![loan_id],
                Self::row_to_loan,
            )
            .optional()?;
        Ok(loan)
    }

    fn list_loans(&self) -> CirculationResult<Vec<Loan>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM loans ORDER BY id", LOAN_COLUMNS))?;
        let loans = stmt
            .query_map([], Self::row_to_loan)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(loans)
    }

    fn count_open_loans(&self, book_id: &str) -> CirculationResult<u32> {
        let count: u32 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM loans WHERE book_id = ?1 AND status = 'Open'",
            params![book_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn insert_reservation(&self, reservation: &Reservation) -> CirculationResult<()> {
        self.conn.lock().execute(
            &format!(
                "INSERT INTO reservations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                RESERVATION_COLUMNS
            ),
            params![
                reservation.id,
                reservation.user_id,
                reservation.book_id,
                reservation.requested_at,
                reservation.expires_at,
                reservation.status.as_str(),
                reservation.notified,
            ],
        )?;
        Ok(())
    }

    fn update_reservation(&self, reservation: &Reservation) -> CirculationResult<()> {
        let rows = self.conn.lock().execute(
            "UPDATE reservations SET status = ?1, notified = ?2 WHERE id = ?3",
            params![reservation.status.as_str(), reservation.notified, reservation.id],
        )?;
        if rows == 0 {
            return Err(CirculationError::ReservationNotFound {
                reservation_id: reservation.id,
            });
        }
        Ok(())
    }

    fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> CirculationResult<Option<Reservation>> {
        let reservation = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM reservations WHERE id = ?1", RESERVATION_COLUMNS),
                params![reservation_id],
                Self::row_to_reservation,
            )
            .optional()?;
        Ok(reservation)
    }

    fn list_reservations(&self) -> CirculationResult<Vec<Reservation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reservations ORDER BY id",
            RESERVATION_COLUMNS
        ))?;
        let reservations = stmt
            .query_map([], Self::row_to_reservation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reservations)
    }

    fn queued_reservations(&self, book_id: &str) -> CirculationResult<Vec<Reservation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reservations WHERE book_id = ?1 AND status = 'Queued'
             ORDER BY requested_at, id",
            RESERVATION_COLUMNS
        ))?;
        let reservations = stmt
            .query_map(params![book_id], Self::row_to_reservation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reservations)
    }

    fn max_loan_id(&self) -> CirculationResult<LoanId> {
        let max: Option<LoanId> =
            self.conn
                .lock()
                .query_row("SELECT MAX(id) FROM loans", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    fn max_reservation_id(&self) -> CirculationResult<ReservationId> {
        let max: Option<ReservationId> =
            self.conn
                .lock()
                .query_row("SELECT MAX(id) FROM reservations", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }
}
