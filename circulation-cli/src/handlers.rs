use serde::{Deserialize, Serialize};

use circulation_core::infrastructure::{LoanFilter, ReservationFilter};
use circulation_core::types::{LoanView, Reservation, ReservationStatus};

// ─── Validation Constants ───────────────────────────────────────────────────

const VALID_LOAN_STATUSES: &[&str] = &["OPEN", "OVERDUE", "RETURNED"];

const VALID_RESERVATION_STATUSES: &[&str] = &["QUEUED", "FULFILLED", "CANCELLED", "EXPIRED"];

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn parse_loan_view(status: &str) -> Result<LoanView, String> {
    match status.to_uppercase().as_str() {
        "OPEN" => Ok(LoanView::Open),
        "OVERDUE" => Ok(LoanView::Overdue),
        "RETURNED" => Ok(LoanView::Returned),
        _ => Err(format!(
            "Invalid loan status '{}'. Must be one of: {}",
            status,
            VALID_LOAN_STATUSES.join(", ")
        )),
    }
}

pub fn parse_reservation_status(status: &str) -> Result<ReservationStatus, String> {
    match status.to_uppercase().as_str() {
        "QUEUED" => Ok(ReservationStatus::Queued),
        "FULFILLED" => Ok(ReservationStatus::Fulfilled),
        "CANCELLED" => Ok(ReservationStatus::Cancelled),
        "EXPIRED" => Ok(ReservationStatus::Expired),
        _ => Err(format!(
            "Invalid reservation status '{}'. Must be one of: {}",
            status,
            VALID_RESERVATION_STATUSES.join(", ")
        )),
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    Ok(())
}

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BorrowRequest {
    pub user_id: String,
    pub book_id: String,
}

impl BorrowRequest {
    pub fn validate(&self) -> Result<(), String> {
        require("user_id", &self.user_id)?;
        require("book_id", &self.book_id)
    }
}

#[derive(Deserialize)]
pub struct ReserveRequest {
    pub user_id: String,
    pub book_id: String,
}

impl ReserveRequest {
    pub fn validate(&self) -> Result<(), String> {
        require("user_id", &self.user_id)?;
        require("book_id", &self.book_id)
    }
}

#[derive(Deserialize, Default)]
pub struct LoanQuery {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    pub status: Option<String>,
}

impl LoanQuery {
    pub fn into_filter(self) -> Result<LoanFilter, String> {
        Ok(LoanFilter {
            user_id: self.user_id,
            book_id: self.book_id,
            status: self.status.as_deref().map(parse_loan_view).transpose()?,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct ReservationQuery {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    pub status: Option<String>,
}

impl ReservationQuery {
    pub fn into_filter(self) -> Result<ReservationFilter, String> {
        Ok(ReservationFilter {
            user_id: self.user_id,
            book_id: self.book_id,
            status: self
                .status
                .as_deref()
                .map(parse_reservation_status)
                .transpose()?,
        })
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub books: usize,
    pub open_loans: usize,
    pub queued_reservations: usize,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub expired: usize,
    pub reservations: Vec<Reservation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_query_parses_status_case_insensitively() {
        let filter = LoanQuery {
            status: Some("overdue".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(LoanView::Overdue));
    }

    #[test]
    fn test_reservation_query_rejects_unknown_status() {
        let err = ReservationQuery {
            status: Some("pending".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert!(err.contains("QUEUED"));
    }

    #[test]
    fn test_borrow_request_requires_ids() {
        let req = BorrowRequest {
            user_id: " ".into(),
            book_id: "b1".into(),
        };
        assert_eq!(req.validate().unwrap_err(), "user_id is required");
    }
}
