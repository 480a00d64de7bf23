//! Clock sources for probe timestamps.
//!
//! Timestamps on the wire are nanoseconds elapsed since local midnight, so
//! they wrap once a day. The transport samples a [`Clock`] at the four points
//! of a round trip; the codec itself never reads a clock.

use chrono::{Local, Timelike};
use std::sync::atomic::{AtomicU64, Ordering};

/// Nanoseconds in one day; every timestamp is below this.
pub const NANOS_PER_DAY: u64 = 86_400 * 1_000_000_000;

/// Source of nanoseconds-of-day readings.
pub trait Clock: Send + Sync {
    fn nanos_of_day(&self) -> u64;
}

/// Wall clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn nanos_of_day(&self) -> u64 {
        let now = Local::now().time();
        let seconds = u64::from(now.num_seconds_from_midnight());
        // chrono reports a leap second as nanosecond >= 1e9
        let nanos = u64::from(now.nanosecond()).min(999_999_999);
        seconds * 1_000_000_000 + nanos
    }
}

/// A clock that returns a preset reading, advancing by `step` on every call.
#[derive(Debug, Default)]
pub struct FixedClock {
    next: AtomicU64,
    step: u64,
}

impl FixedClock {
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
        }
    }
}

impl Clock for FixedClock {
    fn nanos_of_day(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::Relaxed) % NANOS_PER_DAY
    }
}
