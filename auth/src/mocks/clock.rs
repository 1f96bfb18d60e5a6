//! Controllable clock for testing.

use crate::environment::Clock;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock clock.
///
/// Starts at a fixed instant and only moves when told to. Clones share the
/// same time, so a test can hold one handle and advance the clock seen by
/// every component.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a clock frozen at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    /// Jump to an absolute instant.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock().unwrap() = time;
    }
}

impl Default for MockClock {
    /// 2025-01-01 00:00:00 UTC
    fn default() -> Self {
        Self::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

impl Clock for MockClock {
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_2025() {
        assert_eq!(MockClock::default().now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_clones_share_time() {
        let clock = MockClock::default();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::from_secs(90));

        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));
    }
}
