//! Lightweight cost measurement.
//!
//! The update scheduler uses these to measure how long a batch of signal
//! updates took and to derive the per-signal cost it tunes its batch size on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A simple timer that measures elapsed wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    /// Time elapsed since the timer was started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer, log the elapsed time at trace level and return it.
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::trace!(label = self.label, elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX), "timer");
        elapsed
    }
}

/// Accumulating timer for tracking total time across multiple calls.
#[derive(Debug)]
pub struct AccumulatingTimer {
    total_ns: AtomicU64,
    count: AtomicU64,
}

impl Default for AccumulatingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl AccumulatingTimer {
    /// Create a new accumulating timer.
    pub const fn new() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record `calls` operations that together took `elapsed`.
    pub fn record(&self, elapsed: Duration, calls: u64) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_ns.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(calls, Ordering::Relaxed);
    }

    /// Total time recorded.
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_ns.load(Ordering::Relaxed))
    }

    /// Number of operations recorded.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Average time per operation.
    pub fn average(&self) -> Duration {
        let count = self.count();
        if count > 0 {
            Duration::from_nanos(self.total_ns.load(Ordering::Relaxed) / count)
        } else {
            Duration::ZERO
        }
    }

    /// Reset the timer.
    pub fn reset(&self) {
        self.total_ns.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }
}
