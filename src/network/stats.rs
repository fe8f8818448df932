//! Throughput accounting

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::constants::STATS_WINDOW_MS;

/// Time source for the stats window
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Bytes sent, accumulated over a rolling window
#[derive(Debug, Clone)]
pub struct StreamStats {
    window: Duration,
    window_start: Instant,
    window_bytes: u64,
    total_bytes: u64,
    total_writes: u64,
}

impl StreamStats {
    pub fn new(now: Instant) -> Self {
        Self::with_window(now, Duration::from_millis(STATS_WINDOW_MS))
    }

    pub fn with_window(now: Instant, window: Duration) -> Self {
        Self {
            window,
            window_start: now,
            window_bytes: 0,
            total_bytes: 0,
            total_writes: 0,
        }
    }

    /// Count a write of `bytes` at `now`.
    ///
    /// Once the window has run its full length this returns the window's
    /// throughput in kbps and starts a new window at `now`.
    pub fn record(&mut self, bytes: usize, now: Instant) -> Option<f64> {
        self.window_bytes += bytes as u64;
        self.total_bytes += bytes as u64;
        self.total_writes += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let kbps = self.window_bytes as f64 * 8.0 / elapsed.as_secs_f64() / 1000.0;
        self.window_bytes = 0;
        self.window_start = now;
        Some(kbps)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes
    }

    /// Bytes counted in the window still open
    pub fn window_bytes(&self) -> u64 {
        self.window_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_window_yields_1000_kbps() {
        let start = Instant::now();
        let mut stats = StreamStats::new(start);
        assert_eq!(
            stats.record(125_000, start + Duration::from_secs(1)),
            Some(1000.0)
        );
        assert_eq!(stats.window_bytes(), 0);
    }

    #[test]
    fn test_accumulates_until_window_closes() {
        let clock = ManualClock::new(Instant::now());
        let mut stats = StreamStats::new(clock.now());

        clock.advance(Duration::from_millis(400));
        assert_eq!(stats.record(50_000, clock.now()), None);
        clock.advance(Duration::from_millis(600));
        assert_eq!(stats.record(75_000, clock.now()), Some(1000.0));

        // A new window starts at the boundary
        clock.advance(Duration::from_millis(500));
        assert_eq!(stats.record(10, clock.now()), None);
        assert_eq!(stats.total_bytes(), 125_010);
        assert_eq!(stats.total_writes(), 3);
    }

    #[test]
    fn test_long_gap_uses_real_elapsed_time() {
        let start = Instant::now();
        let mut stats = StreamStats::new(start);
        let kbps = stats.record(250_000, start + Duration::from_secs(2)).unwrap();
        assert!((kbps - 1000.0).abs() < 1e-9);
    }
}
