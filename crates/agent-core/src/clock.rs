// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so pool sweeps, timeouts and breaker timers are
//! deterministically testable without sleeping real wall-clock time.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A source of the current time. Production code uses [`SystemClock`];
/// tests use [`FakeClock`] (behind the `test-support` feature) to advance
/// time explicitly instead of sleeping.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(feature = "test-support")]
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: std::sync::Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

#[cfg(feature = "test-support")]
impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: std::sync::Arc::new(parking_lot::Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.inner.lock();
        *guard += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.lock() = at;
    }
}

#[cfg(feature = "test-support")]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[cfg(feature = "test-support")]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock()
    }
}

#[cfg(all(test, feature = "test-support"))]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically_on_request() {
        let clock = FakeClock::new(Utc::now());
        let t0 = clock.now();
        clock.advance(Duration::from_secs(60));
        let t1 = clock.now();
        assert_eq!((t1 - t0).num_seconds(), 60);
    }
}
