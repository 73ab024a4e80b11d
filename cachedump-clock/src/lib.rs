//! Clock abstraction for the cache dump manager.
//!
//! Provides a trait for reading the current UTC instant, with both real and
//! mock implementations to enable deterministic testing of age-based dump
//! retention.

use chrono::{DateTime, SubsecRound, Utc};

/// Round an instant to microsecond resolution.
///
/// Dump filenames carry six fractional digits, so every instant that ends up
/// in a name or is compared against one must be rounded first.
pub fn round_to_micros(time: DateTime<Utc>) -> DateTime<Utc> {
    time.round_subsecs(6)
}

/// Trait for reading the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing with a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    now: DateTime<Utc>,
}

impl MockClock {
    /// Create a mock clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }
}
