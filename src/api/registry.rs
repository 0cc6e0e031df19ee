//! Meter Registry
//!
//! Process-local directory from [`Id`] to meter. Meters are built lazily by a
//! [`MeterFactory`] on the first lookup of an id and returned as-is afterwards.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::composite::{CompositeCounter, CompositeDistributionSummary, CompositeTimer};
use super::id::Id;
use super::meter::{AnyMeter, Counter, DistributionSummary, MeterKind, Timer};
use super::noop::{NoopCounter, NoopDistributionSummary, NoopTimer};

/// Backend glue: builds the meters a registry hands out.
pub trait MeterFactory: Send + Sync {
    fn new_counter(&self, id: Id, clock: Arc<dyn Clock>) -> Arc<dyn Counter>;

    fn new_timer(&self, id: Id, clock: Arc<dyn Clock>) -> Arc<dyn Timer>;

    fn new_distribution_summary(&self, id: Id, clock: Arc<dyn Clock>)
        -> Arc<dyn DistributionSummary>;
}

/// Registry of meters keyed by identifier.
pub struct Registry {
    clock: Arc<dyn Clock>,
    factory: Box<dyn MeterFactory>,
    meters: DashMap<Id, AnyMeter>,
}

impl Registry {
    /// Create a registry using the system clock.
    pub fn new(factory: impl MeterFactory + 'static) -> Self {
        Self::with_clock(factory, Arc::new(SystemClock::new()))
    }

    /// Create a registry with an explicit clock.
    pub fn with_clock(factory: impl MeterFactory + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            factory: Box::new(factory),
            meters: DashMap::new(),
        }
    }

    /// Create a registry whose meters fan out to the same id in every child.
    ///
    /// A child must not be the registry itself.
    pub fn composite(children: Vec<Arc<Registry>>) -> Self {
        Self::new(CompositeFactory::new(children))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create an identifier without tags.
    pub fn create_id(&self, name: impl AsRef<str>) -> Id {
        Id::new(name)
    }

    /// Counter for `id`, built on first use.
    pub fn counter(&self, id: &Id) -> Arc<dyn Counter> {
        let meter = self.get_or_create(id, || {
            AnyMeter::Counter(self.factory.new_counter(id.clone(), self.clock.clone()))
        });
        match meter {
            AnyMeter::Counter(counter) => counter,
            other => {
                self.kind_mismatch(id, MeterKind::Counter, other.kind());
                Arc::new(NoopCounter::new(id.clone()))
            }
        }
    }

    /// Timer for `id`, built on first use.
    pub fn timer(&self, id: &Id) -> Arc<dyn Timer> {
        let meter = self.get_or_create(id, || {
            AnyMeter::Timer(self.factory.new_timer(id.clone(), self.clock.clone()))
        });
        match meter {
            AnyMeter::Timer(timer) => timer,
            other => {
                self.kind_mismatch(id, MeterKind::Timer, other.kind());
                Arc::new(NoopTimer::new(id.clone()))
            }
        }
    }

    /// Distribution summary for `id`, built on first use.
    pub fn distribution_summary(&self, id: &Id) -> Arc<dyn DistributionSummary> {
        let meter = self.get_or_create(id, || {
            AnyMeter::DistributionSummary(
                self.factory
                    .new_distribution_summary(id.clone(), self.clock.clone()),
            )
        });
        match meter {
            AnyMeter::DistributionSummary(summary) => summary,
            other => {
                self.kind_mismatch(id, MeterKind::DistributionSummary, other.kind());
                Arc::new(NoopDistributionSummary::new(id.clone()))
            }
        }
    }

    pub fn counter_named(&self, name: &str) -> Arc<dyn Counter> {
        self.counter(&self.create_id(name))
    }

    pub fn timer_named(&self, name: &str) -> Arc<dyn Timer> {
        self.timer(&self.create_id(name))
    }

    pub fn distribution_summary_named(&self, name: &str) -> Arc<dyn DistributionSummary> {
        self.distribution_summary(&self.create_id(name))
    }

    /// Registered meter for `id`, if any.
    pub fn get(&self, id: &Id) -> Option<AnyMeter> {
        self.meters.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of all registered meters.
    ///
    /// Safe to call while other threads register meters; meters added during
    /// the call may or may not be included.
    pub fn meters(&self) -> Vec<AnyMeter> {
        self.meters
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    fn get_or_create(&self, id: &Id, create: impl FnOnce() -> AnyMeter) -> AnyMeter {
        if let Some(existing) = self.meters.get(id) {
            return existing.value().clone();
        }
        let entry = self.meters.entry(id.clone()).or_insert_with(|| {
            debug!(id = %id, "Registering new meter");
            create()
        });
        entry.value().clone()
    }

    fn kind_mismatch(&self, id: &Id, requested: MeterKind, registered: MeterKind) {
        warn!(
            id = %id,
            %requested,
            %registered,
            "Meter already registered with a different kind, returning no-op"
        );
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("clock", &self.clock)
            .field("meters", &self.meters.len())
            .finish()
    }
}

// =============================================================================
// Composite Factory
// =============================================================================

/// Builds composite meters over a fixed list of child registries.
#[derive(Debug)]
pub struct CompositeFactory {
    registries: Vec<Arc<Registry>>,
}

impl CompositeFactory {
    pub fn new(registries: Vec<Arc<Registry>>) -> Self {
        Self { registries }
    }
}

impl MeterFactory for CompositeFactory {
    fn new_counter(&self, id: Id, _clock: Arc<dyn Clock>) -> Arc<dyn Counter> {
        let counters = self.registries.iter().map(|r| r.counter(&id)).collect();
        Arc::new(CompositeCounter::new(id, counters))
    }

    fn new_timer(&self, id: Id, clock: Arc<dyn Clock>) -> Arc<dyn Timer> {
        let timers = self.registries.iter().map(|r| r.timer(&id)).collect();
        Arc::new(CompositeTimer::new(id, clock, timers))
    }

    fn new_distribution_summary(
        &self,
        id: Id,
        _clock: Arc<dyn Clock>,
    ) -> Arc<dyn DistributionSummary> {
        let summaries = self
            .registries
            .iter()
            .map(|r| r.distribution_summary(&id))
            .collect();
        Arc::new(CompositeDistributionSummary::new(id, summaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::clock::ManualClock;
    use crate::api::noop::NoopFactory;
    use crate::backend::AtomicFactory;
    use std::time::Duration;

    fn registry() -> Registry {
        Registry::with_clock(AtomicFactory, Arc::new(ManualClock::new(1_000, 0)))
    }

    #[test]
    fn test_lookup_is_idempotent() {
        let registry = registry();
        let a = registry.counter(&Id::new("hits").with_tag("x", "1").with_tag("y", "2"));
        let b = registry.counter(&Id::new("hits").with_tag("y", "2").with_tag("x", "1"));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        a.increment();
        assert_eq!(b.count(), 1.0);
    }

    #[test]
    fn test_distinct_ids_get_distinct_meters() {
        let registry = registry();
        let a = registry.counter_named("a");
        let b = registry.counter_named("b");

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_kind_mismatch_returns_noop() {
        let registry = registry();
        let counter = registry.counter_named("shared");
        counter.add(3.0);

        let timer = registry.timer_named("shared");
        timer.record(Duration::from_secs(1));

        assert_eq!(timer.count(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&Id::new("shared")).map(|m| m.kind()),
            Some(MeterKind::Counter)
        );
        assert_eq!(registry.distribution_summary_named("shared").count(), 0);
    }

    #[test]
    fn test_meters_snapshot() {
        let registry = registry();
        registry.counter_named("c");
        registry.timer_named("t");
        registry.distribution_summary_named("s");

        let mut kinds: Vec<String> = registry
            .meters()
            .iter()
            .map(|m| m.kind().to_string())
            .collect();
        kinds.sort();
        assert_eq!(kinds, vec!["counter", "distribution summary", "timer"]);
    }

    #[test]
    fn test_iteration_during_concurrent_inserts() {
        let registry = Arc::new(registry());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        registry
                            .counter(
                                &Id::new("load")
                                    .with_tag("thread", t.to_string())
                                    .with_tag("i", i.to_string()),
                            )
                            .increment();
                    }
                })
            })
            .collect();

        let mut last = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            let seen = registry.meters().len();
            assert!(seen >= last);
            last = seen;
        }
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(registry.meters().len(), 2_000);
    }

    #[test]
    fn test_composite_registry_fans_out_to_children() {
        let first = Arc::new(registry());
        let second = Arc::new(registry());
        let composite = Registry::composite(vec![first.clone(), second.clone()]);

        let id = Id::new("requests").with_tag("status", "200");
        composite.counter(&id).add(2.0);
        composite
            .timer_named("latency")
            .record(Duration::from_millis(3));

        assert_eq!(first.counter(&id).count(), 2.0);
        assert_eq!(second.counter(&id).count(), 2.0);
        assert_eq!(second.timer_named("latency").count(), 1);
        assert_eq!(
            composite.timer_named("latency").total_time(),
            Duration::from_millis(3)
        );
    }

    #[test]
    fn test_noop_registry() {
        let registry = Registry::new(NoopFactory);
        registry.counter_named("c").increment();

        assert_eq!(registry.counter_named("c").count(), 0.0);
        assert_eq!(registry.len(), 1);
        assert!(format!("{:?}", registry).contains("meters: 1"));
    }
}
