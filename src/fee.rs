//! Parking fee
//!
//! A stay is billed per completed ten second period at 1000 colones each.
//! The gate display has one digit, so only `(colones / 1000) % 10` can be
//! shown; stays of ten periods or more alias on the display while
//! [`Fee::colones`] still carries the full amount.

use embassy_time::{Duration, Instant};

/// Billing period
pub const PERIOD: Duration = Duration::from_secs(10);

/// Price of one period in colones
pub const RATE_COLONES: u64 = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fee {
    periods: u64,
}

impl Fee {
    pub const fn from_periods(periods: u64) -> Self {
        Self { periods }
    }

    /// Fee for a stay of `elapsed`, counting whole periods only
    pub fn for_stay(elapsed: Duration) -> Self {
        Self {
            periods: elapsed.as_ticks() / PERIOD.as_ticks(),
        }
    }

    /// Fee for a vehicle that entered at `entered_at`, evaluated at `now`
    pub fn between(entered_at: Instant, now: Instant) -> Self {
        let elapsed = now
            .checked_duration_since(entered_at)
            .unwrap_or(Duration::from_ticks(0));
        Self::for_stay(elapsed)
    }

    pub const fn periods(&self) -> u64 {
        self.periods
    }

    /// Full amount owed
    pub const fn colones(&self) -> u64 {
        self.periods * RATE_COLONES
    }

    /// The digit shown on the gate display
    pub const fn digit(&self) -> u8 {
        ((self.colones() / RATE_COLONES) % 10) as u8
    }
}
