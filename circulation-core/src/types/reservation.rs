use serde::{Deserialize, Serialize};

use super::{BookId, ReservationId, Timestamp, UserId};

/// Reservation states. Every state but `Queued` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Waiting for a copy
    Queued,
    /// A returned copy was handed to this reservation as a loan
    Fulfilled,
    /// Withdrawn by the user
    Cancelled,
    /// Window elapsed while still queued
    Expired,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Queued => "Queued",
            ReservationStatus::Fulfilled => "Fulfilled",
            ReservationStatus::Cancelled => "Cancelled",
            ReservationStatus::Expired => "Expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Queued" => Some(ReservationStatus::Queued),
            "Fulfilled" => Some(ReservationStatus::Fulfilled),
            "Cancelled" => Some(ReservationStatus::Cancelled),
            "Expired" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's place in a book's waiting line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub requested_at: Timestamp,
    pub expires_at: Timestamp,
    pub status: ReservationStatus,
    /// Whether the user was told a copy is waiting for them
    pub notified: bool,
}

impl Reservation {
    pub fn new(
        id: ReservationId,
        user_id: UserId,
        book_id: BookId,
        requested_at: Timestamp,
        window_ms: u64,
    ) -> Self {
        Self {
            id,
            user_id,
            book_id,
            requested_at,
            expires_at: requested_at.saturating_add(window_ms),
            status: ReservationStatus::Queued,
            notified: false,
        }
    }

    /// Stored status, except a queued reservation past its window reads as
    /// `Expired` even before a sweep has written it.
    pub fn status_at(&self, now: Timestamp) -> ReservationStatus {
        if self.status == ReservationStatus::Queued && self.expires_at <= now {
            ReservationStatus::Expired
        } else {
            self.status
        }
    }

    /// FIFO key: request time, then insertion order.
    pub fn queue_key(&self) -> (Timestamp, ReservationId) {
        (self.requested_at, self.id)
    }
}
