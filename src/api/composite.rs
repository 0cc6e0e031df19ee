//! Composite meters
//!
//! A composite wraps N delegate meters of one kind behind a single id. Every
//! mutation is forwarded to every delegate in array order; reads come from
//! delegate 0, which is the canonical source.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::clock::Clock;
use super::id::Id;
use super::measurement::Measurements;
use super::meter::{Counter, DistributionSummary, Meter, Timer};

/// Apply `f` to each delegate in order. A panicking delegate is logged and
/// skipped so the remaining delegates still see the call.
fn fan_out<T: ?Sized>(id: &Id, delegates: &[Arc<T>], f: impl Fn(&T)) {
    for (index, delegate) in delegates.iter().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(delegate)));
        if outcome.is_err() {
            warn!(id = %id, index, "Delegate meter panicked during fan-out");
        }
    }
}

fn measure_all<T: Meter + ?Sized>(delegates: &[Arc<T>]) -> Measurements {
    delegates
        .iter()
        .flat_map(|d| d.measure())
        .collect::<Vec<_>>()
        .into_iter()
}

// =============================================================================
// Counter
// =============================================================================

/// Counter forwarding to several backend counters.
pub struct CompositeCounter {
    id: Id,
    counters: Vec<Arc<dyn Counter>>,
}

impl CompositeCounter {
    pub fn new(id: Id, counters: Vec<Arc<dyn Counter>>) -> Self {
        Self { id, counters }
    }

    pub fn delegates(&self) -> &[Arc<dyn Counter>] {
        &self.counters
    }
}

impl Meter for CompositeCounter {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        measure_all(&self.counters)
    }
}

impl Counter for CompositeCounter {
    fn add(&self, amount: f64) {
        fan_out(&self.id, &self.counters, |c| c.add(amount));
    }

    fn count(&self) -> f64 {
        self.counters.first().map_or(0.0, |c| c.count())
    }
}

impl fmt::Debug for CompositeCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeCounter")
            .field("id", &self.id)
            .field("delegates", &self.counters.len())
            .finish()
    }
}

// =============================================================================
// Timer
// =============================================================================

/// Timer forwarding to several backend timers.
///
/// Closures timed through [`TimerExt`](super::meter::TimerExt) are measured
/// once with this composite's clock and the elapsed time is recorded on every
/// delegate.
pub struct CompositeTimer {
    id: Id,
    clock: Arc<dyn Clock>,
    timers: Vec<Arc<dyn Timer>>,
}

impl CompositeTimer {
    pub fn new(id: Id, clock: Arc<dyn Clock>, timers: Vec<Arc<dyn Timer>>) -> Self {
        Self { id, clock, timers }
    }

    pub fn delegates(&self) -> &[Arc<dyn Timer>] {
        &self.timers
    }
}

impl Meter for CompositeTimer {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        measure_all(&self.timers)
    }
}

impl Timer for CompositeTimer {
    fn record(&self, amount: Duration) {
        fan_out(&self.id, &self.timers, |t| t.record(amount));
    }

    fn count(&self) -> u64 {
        self.timers.first().map_or(0, |t| t.count())
    }

    fn total_time(&self) -> Duration {
        self.timers
            .first()
            .map_or(Duration::ZERO, |t| t.total_time())
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl fmt::Debug for CompositeTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTimer")
            .field("id", &self.id)
            .field("delegates", &self.timers.len())
            .finish()
    }
}

// =============================================================================
// Distribution Summary
// =============================================================================

/// Distribution summary forwarding to several backend summaries.
pub struct CompositeDistributionSummary {
    id: Id,
    summaries: Vec<Arc<dyn DistributionSummary>>,
}

impl CompositeDistributionSummary {
    pub fn new(id: Id, summaries: Vec<Arc<dyn DistributionSummary>>) -> Self {
        Self { id, summaries }
    }

    pub fn delegates(&self) -> &[Arc<dyn DistributionSummary>] {
        &self.summaries
    }
}

impl Meter for CompositeDistributionSummary {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        measure_all(&self.summaries)
    }
}

impl DistributionSummary for CompositeDistributionSummary {
    fn record(&self, amount: u64) {
        fan_out(&self.id, &self.summaries, |s| s.record(amount));
    }

    fn count(&self) -> u64 {
        self.summaries.first().map_or(0, |s| s.count())
    }

    fn total_amount(&self) -> u64 {
        self.summaries.first().map_or(0, |s| s.total_amount())
    }
}

impl fmt::Debug for CompositeDistributionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDistributionSummary")
            .field("id", &self.id)
            .field("delegates", &self.summaries.len())
            .finish()
    }
}
