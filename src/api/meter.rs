//! Meter capability traits
//!
//! Each meter kind is a trait. Backends, composites and the no-op meters are
//! concrete implementations picked when the registry builds a meter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::clock::Clock;
use super::id::Id;
use super::measurement::Measurements;

/// A named, tagged, stateful accumulator.
pub trait Meter: Send + Sync {
    /// Identity of this meter, fixed at construction.
    fn id(&self) -> &Id;

    /// Snapshot of the current values. One call is one consistent read.
    fn measure(&self) -> Measurements;
}

/// Monotonically increasing count.
pub trait Counter: Meter {
    /// Add `amount` to the count.
    fn add(&self, amount: f64);

    /// Add one to the count.
    fn increment(&self) {
        self.add(1.0);
    }

    /// Current count.
    fn count(&self) -> f64;
}

/// Count and total of recorded durations.
pub trait Timer: Meter {
    fn record(&self, amount: Duration);

    /// Number of recorded events.
    fn count(&self) -> u64;

    /// Sum of all recorded durations.
    fn total_time(&self) -> Duration;

    /// Clock used to time closures passed to [`TimerExt`].
    fn clock(&self) -> &dyn Clock;
}

/// Count and total of recorded amounts, e.g. response sizes.
pub trait DistributionSummary: Meter {
    fn record(&self, amount: u64);

    fn count(&self) -> u64;

    fn total_amount(&self) -> u64;
}

/// Higher-order recording for every [`Timer`].
///
/// The elapsed time is recorded from a drop guard, so it lands on the timer
/// when the closure returns normally, returns an `Err`, or panics.
pub trait TimerExt: Timer {
    /// Time `f` and return its result.
    fn record_fn<T, F>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _guard = RecordGuard::start(self);
        f()
    }

    /// Time a fallible computation; failures are timed too.
    fn record_result<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.record_fn(f)
    }
}

impl<T: Timer + ?Sized> TimerExt for T {}

struct RecordGuard<'a, T: Timer + ?Sized> {
    timer: &'a T,
    start: u64,
}

impl<'a, T: Timer + ?Sized> RecordGuard<'a, T> {
    fn start(timer: &'a T) -> Self {
        Self {
            start: timer.clock().monotonic_time(),
            timer,
        }
    }
}

impl<T: Timer + ?Sized> Drop for RecordGuard<'_, T> {
    fn drop(&mut self) {
        let end = self.timer.clock().monotonic_time();
        self.timer
            .record(Duration::from_nanos(end.saturating_sub(self.start)));
    }
}

/// Kind of a registered meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterKind {
    Counter,
    Timer,
    DistributionSummary,
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeterKind::Counter => write!(f, "counter"),
            MeterKind::Timer => write!(f, "timer"),
            MeterKind::DistributionSummary => write!(f, "distribution summary"),
        }
    }
}

/// A meter of any kind, as stored in the registry.
#[derive(Clone)]
pub enum AnyMeter {
    Counter(Arc<dyn Counter>),
    Timer(Arc<dyn Timer>),
    DistributionSummary(Arc<dyn DistributionSummary>),
}

impl AnyMeter {
    pub fn kind(&self) -> MeterKind {
        match self {
            AnyMeter::Counter(_) => MeterKind::Counter,
            AnyMeter::Timer(_) => MeterKind::Timer,
            AnyMeter::DistributionSummary(_) => MeterKind::DistributionSummary,
        }
    }

    pub fn id(&self) -> &Id {
        match self {
            AnyMeter::Counter(m) => m.id(),
            AnyMeter::Timer(m) => m.id(),
            AnyMeter::DistributionSummary(m) => m.id(),
        }
    }

    pub fn measure(&self) -> Measurements {
        match self {
            AnyMeter::Counter(m) => m.measure(),
            AnyMeter::Timer(m) => m.measure(),
            AnyMeter::DistributionSummary(m) => m.measure(),
        }
    }
}

impl fmt::Debug for AnyMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyMeter")
            .field("kind", &self.kind())
            .field("id", self.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::clock::ManualClock;
    use crate::api::measurement::Measurement;
    use parking_lot::Mutex;

    /// Timer that keeps every recorded amount and advances its clock when
    /// asked for the time, so every timed closure takes 10ns.
    #[derive(Debug)]
    struct RecordingTimer {
        id: Id,
        clock: ManualClock,
        recorded: Mutex<Vec<Duration>>,
    }

    impl RecordingTimer {
        fn new() -> Self {
            Self {
                id: Id::new("test.timer"),
                clock: ManualClock::new(0, 0),
                recorded: Mutex::new(Vec::new()),
            }
        }
    }

    impl Meter for RecordingTimer {
        fn id(&self) -> &Id {
            &self.id
        }

        fn measure(&self) -> Measurements {
            let count = self.count() as f64;
            vec![Measurement::new(self.id.clone(), 0, count)].into_iter()
        }
    }

    impl Timer for RecordingTimer {
        fn record(&self, amount: Duration) {
            self.recorded.lock().push(amount);
        }

        fn count(&self) -> u64 {
            self.recorded.lock().len() as u64
        }

        fn total_time(&self) -> Duration {
            self.recorded.lock().iter().sum()
        }

        fn clock(&self) -> &dyn Clock {
            self.clock.advance(10);
            &self.clock
        }
    }

    #[test]
    fn test_record_fn_returns_value() {
        let timer = RecordingTimer::new();
        let value = timer.record_fn(|| 42);

        assert_eq!(value, 42);
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.total_time(), Duration::from_nanos(10));
    }

    #[test]
    fn test_record_result_times_errors() {
        let timer = RecordingTimer::new();
        let result: Result<(), &str> = timer.record_result(|| Err("boom"));

        assert_eq!(result, Err("boom"));
        assert_eq!(timer.count(), 1);
    }

    #[test]
    fn test_record_fn_times_panics() {
        let timer = RecordingTimer::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            timer.record_fn(|| panic!("boom"));
        }));

        assert!(outcome.is_err());
        assert_eq!(timer.count(), 1);
    }

    #[test]
    fn test_any_meter_delegates() {
        let timer: Arc<dyn Timer> = Arc::new(RecordingTimer::new());
        timer.record(Duration::from_millis(1));
        let meter = AnyMeter::Timer(timer);

        assert_eq!(meter.kind(), MeterKind::Timer);
        assert_eq!(meter.id().name(), "test.timer");
        assert_eq!(meter.measure().count(), 1);
        assert!(format!("{:?}", meter).contains("Timer"));
    }
}
