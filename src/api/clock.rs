//! Time sources
//!
//! Meters never read the system time directly: they go through a [`Clock`]
//! handed to them at construction so tests can drive time by hand.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;

/// Source of wall-clock and monotonic time.
pub trait Clock: Debug + Send + Sync {
    /// Wall-clock time in milliseconds since the Unix epoch.
    fn wall_time(&self) -> i64;

    /// Monotonic time in nanoseconds from an arbitrary origin.
    fn monotonic_time(&self) -> u64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy)]
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
    fn wall_time(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn monotonic_time(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Clock whose readings are set explicitly.
#[derive(Debug, Default)]
pub struct ManualClock {
    wall: AtomicI64,
    monotonic: AtomicU64,
}

impl ManualClock {
    pub fn new(wall_time: i64, monotonic_time: u64) -> Self {
        Self {
            wall: AtomicI64::new(wall_time),
            monotonic: AtomicU64::new(monotonic_time),
        }
    }

    pub fn set_wall_time(&self, millis: i64) {
        self.wall.store(millis, Ordering::SeqCst);
    }

    pub fn set_monotonic_time(&self, nanos: u64) {
        self.monotonic.store(nanos, Ordering::SeqCst);
    }

    /// Move the monotonic reading forward.
    pub fn advance(&self, nanos: u64) {
        self.monotonic.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn wall_time(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }

    fn monotonic_time(&self) -> u64 {
        self.monotonic.load(Ordering::SeqCst)
    }
}
