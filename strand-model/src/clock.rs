//! Clock abstraction for testable time
//!
//! Bundle timestamps are microseconds since the Unix epoch.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in microseconds.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> i64;
}

/// Real system clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0)
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct MockClock {
    micros: AtomicI64,
}

impl MockClock {
    pub fn new(micros: i64) -> Self {
        Self { micros: AtomicI64::new(micros) }
    }

    pub fn set(&self, micros: i64) {
        self.micros.store(micros, Ordering::SeqCst);
    }

    pub fn advance(&self, micros: i64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_micros(&self) -> i64 {
        self.micros.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_reasonable_time() {
        let now = SystemClock.now_micros();
        // After 2025-01-01
        assert!(now > 1_735_689_600_000_000);
    }

    #[test]
    fn test_mock_clock_moves_only_when_told() {
        let clock = MockClock::new(12345);
        assert_eq!(clock.now_micros(), 12345);
        clock.advance(5);
        assert_eq!(clock.now_micros(), 12350);
        clock.set(7);
        assert_eq!(clock.now_micros(), 7);
    }
}
