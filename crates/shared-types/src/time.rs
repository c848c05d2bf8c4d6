//! # Time Source Port
//!
//! Wall-clock access behind a trait so liveness and event timestamps can be
//! driven deterministically in tests.

use chrono::{DateTime, Utc};

/// Abstract interface for time operations.
pub trait TimeSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production time source backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A time source that only moves when told to.
///
/// Enable with the `test-utils` feature flag.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct ManualTimeSource {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ManualTimeSource {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
