use serde::{Deserialize, Serialize};

/// Lending rules. Fixed for the lifetime of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CirculationPolicy {
    /// Days from borrow to due date
    pub loan_period_days: u32,
    /// Fine per full overdue day, in cents
    pub daily_fine_cents: u64,
    /// Days a queued reservation waits before it expires
    pub reservation_window_days: u32,
}

impl CirculationPolicy {
    pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 15;
    pub const DEFAULT_DAILY_FINE_CENTS: u64 = 200;
    pub const DEFAULT_RESERVATION_WINDOW_DAYS: u32 = 3;
}

impl Default for CirculationPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: Self::DEFAULT_LOAN_PERIOD_DAYS,
            daily_fine_cents: Self::DEFAULT_DAILY_FINE_CENTS,
            reservation_window_days: Self::DEFAULT_RESERVATION_WINDOW_DAYS,
        }
    }
}
