use serde::{Deserialize, Serialize};

/// Catalog identity of a title. Owned by the catalog, opaque here.
pub type BookId = String;

/// Opaque, already-authenticated user token.
pub type UserId = String;

pub type LoanId = u64;

pub type ReservationId = u64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

pub const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Converts a whole number of days into a millisecond offset.
pub fn days(n: u32) -> u64 {
    u64::from(n) * MS_PER_DAY
}

/// Point-in-time view of one book's copy counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub book_id: BookId,
    pub total_copies: u32,
    pub available_copies: u32,
}

