//! Clock abstraction used by the admission algorithms.
//!
//! All rate-limit state is expressed as durations since one clock origin,
//! so a whole gateway must share a single clock instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe monotonic time source.
///
/// `now` returns the elapsed time since the implementer's origin and must
/// be non-decreasing across calls. Readings from different clock instances
/// are not comparable.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic elapsed time since this clock's origin.
    fn now(&self) -> Duration;
}

/// Monotonic clock backed by `Instant::now()`.
///
/// The origin is captured at creation; resets on process restart.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Manually stepped clock for deterministic tests.
///
/// Starts at zero and only moves when told to. `advance` and `set` are
/// safe to call concurrently with readers.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(u64::try_from(by.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Jump the clock to an absolute reading. Must not move backwards.
    pub fn set(&self, to: Duration) {
        self.nanos
            .store(u64::try_from(to.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
