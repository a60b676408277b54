//! Time sources for the engine.
//!
//! Two readings are needed: a monotonic millisecond counter for reaction times
//! and debouncing, and wall-clock epoch milliseconds for result timestamps.
//! [`ManualClock`] makes both fully controllable in tests and simulations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn monotonic_ms(&self) -> f64;
    /// Unix epoch milliseconds.
    fn wall_ms(&self) -> i64;
}

/// Real time: `Instant` for monotonic readings, `chrono::Utc` for wall time.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn wall_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock. Clones share the same time, so a test can keep
/// one handle and give another to the engine.
#[derive(Clone, Debug)]
pub struct ManualClock {
    /// Monotonic time as `f64` bits.
    now_bits: Arc<AtomicU64>,
    wall_origin_ms: i64,
}

impl ManualClock {
    pub fn new(wall_origin_ms: i64) -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(0f64.to_bits())),
            wall_origin_ms,
        }
    }

    pub fn advance(&self, ms: f64) {
        let now = self.monotonic_ms() + ms;
        self.now_bits.store(now.to_bits(), Ordering::SeqCst);
    }

    pub fn set(&self, ms: f64) {
        self.now_bits.store(ms.to_bits(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }

    fn wall_ms(&self) -> i64 {
        self.wall_origin_ms + self.monotonic_ms() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let handle = clock.clone();
        handle.advance(250.5);
        assert_eq!(clock.monotonic_ms(), 250.5);
        assert_eq!(clock.wall_ms(), 1_250);
        clock.set(10.0);
        assert_eq!(handle.monotonic_ms(), 10.0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
        assert!(clock.wall_ms() > 1_600_000_000_000);
    }
}
