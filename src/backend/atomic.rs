//! In-process atomic meters
//!
//! Lock-free meters kept entirely in memory. Values are cumulative since
//! creation; each `measure` call reads them once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::stat_id;
use crate::api::{
    Clock, Counter, DistributionSummary, Id, Measurement, Measurements, Meter, MeterFactory,
    Statistic, Timer,
};

// =============================================================================
// Counter
// =============================================================================

/// Counter storing an `f64` as raw bits.
#[derive(Debug)]
pub struct AtomicCounter {
    id: Id,
    count_id: Id,
    clock: Arc<dyn Clock>,
    bits: AtomicU64,
}

impl AtomicCounter {
    pub fn new(id: Id, clock: Arc<dyn Clock>) -> Self {
        Self {
            count_id: stat_id(&id, Statistic::Count),
            id,
            clock,
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }
}

impl Meter for AtomicCounter {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        vec![Measurement::new(
            self.count_id.clone(),
            self.clock.wall_time(),
            self.count(),
        )]
        .into_iter()
    }
}

impl Counter for AtomicCounter {
    fn add(&self, amount: f64) {
        loop {
            let current = self.bits.load(Ordering::Relaxed);
            let updated = (f64::from_bits(current) + amount).to_bits();

            if self
                .bits
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    fn count(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Timer
// =============================================================================

/// Timer tracking event count and total nanoseconds.
#[derive(Debug)]
pub struct AtomicTimer {
    id: Id,
    count_id: Id,
    total_id: Id,
    clock: Arc<dyn Clock>,
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl AtomicTimer {
    pub fn new(id: Id, clock: Arc<dyn Clock>) -> Self {
        Self {
            count_id: stat_id(&id, Statistic::Count),
            total_id: stat_id(&id, Statistic::TotalTime),
            id,
            clock,
            count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
        }
    }
}

impl Meter for AtomicTimer {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        let now = self.clock.wall_time();
        vec![
            Measurement::new(self.count_id.clone(), now, self.count() as f64),
            Measurement::new(self.total_id.clone(), now, self.total_time().as_secs_f64()),
        ]
        .into_iter()
    }
}

impl Timer for AtomicTimer {
    fn record(&self, amount: Duration) {
        let nanos = u64::try_from(amount.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn total_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

// =============================================================================
// Distribution Summary
// =============================================================================

/// Distribution summary tracking event count and total amount.
#[derive(Debug)]
pub struct AtomicDistributionSummary {
    id: Id,
    count_id: Id,
    total_id: Id,
    clock: Arc<dyn Clock>,
    count: AtomicU64,
    total: AtomicU64,
}

impl AtomicDistributionSummary {
    pub fn new(id: Id, clock: Arc<dyn Clock>) -> Self {
        Self {
            count_id: stat_id(&id, Statistic::Count),
            total_id: stat_id(&id, Statistic::TotalAmount),
            id,
            clock,
            count: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }
}

impl Meter for AtomicDistributionSummary {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        let now = self.clock.wall_time();
        vec![
            Measurement::new(self.count_id.clone(), now, self.count() as f64),
            Measurement::new(self.total_id.clone(), now, self.total_amount() as f64),
        ]
        .into_iter()
    }
}

impl DistributionSummary for AtomicDistributionSummary {
    fn record(&self, amount: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(amount, Ordering::Relaxed);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn total_amount(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Backend building [`AtomicCounter`], [`AtomicTimer`] and
/// [`AtomicDistributionSummary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicFactory;

impl MeterFactory for AtomicFactory {
    fn new_counter(&self, id: Id, clock: Arc<dyn Clock>) -> Arc<dyn Counter> {
        Arc::new(AtomicCounter::new(id, clock))
    }

    fn new_timer(&self, id: Id, clock: Arc<dyn Clock>) -> Arc<dyn Timer> {
        Arc::new(AtomicTimer::new(id, clock))
    }

    fn new_distribution_summary(
        &self,
        id: Id,
        clock: Arc<dyn Clock>,
    ) -> Arc<dyn DistributionSummary> {
        Arc::new(AtomicDistributionSummary::new(id, clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ManualClock, TimerExt};

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(1_700_000_000_000, 0))
    }

    #[test]
    fn test_counter_add_and_measure() {
        let counter = AtomicCounter::new(Id::new("requests"), clock());
        counter.increment();
        counter.add(2.5);

        assert_eq!(counter.count(), 3.5);

        let ms: Vec<Measurement> = counter.measure().collect();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].value(), 3.5);
        assert_eq!(ms[0].timestamp(), 1_700_000_000_000);
        assert_eq!(ms[0].id().name(), "requests");
        assert_eq!(ms[0].id().tag("statistic"), Some("count"));
        assert_eq!(ms[0].data_type(), "counter");
    }

    #[test]
    fn test_counter_concurrent_adds() {
        let counter = Arc::new(AtomicCounter::new(Id::new("c"), clock()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.count(), 8_000.0);
    }

    #[test]
    fn test_counter_can_hold_nan() {
        let counter = AtomicCounter::new(Id::new("c"), clock());
        counter.add(f64::NAN);
        assert!(counter.count().is_nan());
    }

    #[test]
    fn test_timer_measure() {
        let timer = AtomicTimer::new(Id::new("latency"), clock());
        timer.record(Duration::from_millis(250));
        timer.record(Duration::from_millis(750));

        assert_eq!(timer.count(), 2);
        assert_eq!(timer.total_time(), Duration::from_secs(1));

        let ms: Vec<Measurement> = timer.measure().collect();
        assert_eq!(ms.len(), 2);
        assert_eq!(ms[0].id().tag("statistic"), Some("count"));
        assert_eq!(ms[0].value(), 2.0);
        assert_eq!(ms[1].id().tag("statistic"), Some("totalTime"));
        assert_eq!(ms[1].value(), 1.0);
    }

    #[test]
    fn test_timer_record_fn_uses_clock() {
        let manual = Arc::new(ManualClock::new(0, 0));
        let timer = AtomicTimer::new(Id::new("latency"), manual.clone());

        timer.record_fn(|| manual.advance(1_500));

        assert_eq!(timer.total_time(), Duration::from_nanos(1_500));
    }

    #[test]
    fn test_summary_measure() {
        let summary = AtomicDistributionSummary::new(Id::new("bytes"), clock());
        summary.record(100);
        summary.record(300);

        let ms: Vec<Measurement> = summary.measure().collect();
        assert_eq!(summary.count(), 2);
        assert_eq!(summary.total_amount(), 400);
        assert_eq!(ms[1].id().tag("statistic"), Some("totalAmount"));
        assert_eq!(ms[1].value(), 400.0);
    }

    #[test]
    fn test_caller_type_tag_is_kept() {
        let counter = AtomicCounter::new(Id::new("c").with_tag("type", "rate"), clock());

        let m = counter.measure().next().unwrap();
        assert_eq!(m.data_type(), "rate");
        assert_eq!(m.id().tags()[0].key(), "type");
        assert_eq!(m.id().tags()[1].key(), "statistic");
    }
}
