//! No-op meters
//!
//! Explicit values rather than a hidden global: the registry hands these out
//! on kind mismatches, and [`NoopFactory`] turns a whole registry off.

use std::sync::Arc;
use std::time::Duration;

use super::clock::{Clock, SystemClock};
use super::id::Id;
use super::measurement::Measurements;
use super::meter::{Counter, DistributionSummary, Meter, Timer};
use super::registry::MeterFactory;

#[derive(Debug, Clone)]
pub struct NoopCounter {
    id: Id,
}

impl NoopCounter {
    pub fn new(id: Id) -> Self {
        Self { id }
    }
}

impl Meter for NoopCounter {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        Vec::new().into_iter()
    }
}

impl Counter for NoopCounter {
    fn add(&self, _amount: f64) {}

    fn count(&self) -> f64 {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct NoopTimer {
    id: Id,
    clock: SystemClock,
}

impl NoopTimer {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            clock: SystemClock::new(),
        }
    }
}

impl Meter for NoopTimer {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        Vec::new().into_iter()
    }
}

impl Timer for NoopTimer {
    fn record(&self, _amount: Duration) {}

    fn count(&self) -> u64 {
        0
    }

    fn total_time(&self) -> Duration {
        Duration::ZERO
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}

#[derive(Debug, Clone)]
pub struct NoopDistributionSummary {
    id: Id,
}

impl NoopDistributionSummary {
    pub fn new(id: Id) -> Self {
        Self { id }
    }
}

impl Meter for NoopDistributionSummary {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        Vec::new().into_iter()
    }
}

impl DistributionSummary for NoopDistributionSummary {
    fn record(&self, _amount: u64) {}

    fn count(&self) -> u64 {
        0
    }

    fn total_amount(&self) -> u64 {
        0
    }
}

/// Backend whose meters discard everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFactory;

impl MeterFactory for NoopFactory {
    fn new_counter(&self, id: Id, _clock: Arc<dyn Clock>) -> Arc<dyn Counter> {
        Arc::new(NoopCounter::new(id))
    }

    fn new_timer(&self, id: Id, _clock: Arc<dyn Clock>) -> Arc<dyn Timer> {
        Arc::new(NoopTimer::new(id))
    }

    fn new_distribution_summary(
        &self,
        id: Id,
        _clock: Arc<dyn Clock>,
    ) -> Arc<dyn DistributionSummary> {
        Arc::new(NoopDistributionSummary::new(id))
    }
}
