//! Recording meters shared by unit tests.

#![cfg(test)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::clock::Clock;
use super::id::Id;
use super::measurement::{Measurement, Measurements};
use super::meter::{Counter, DistributionSummary, Meter, Timer};

/// Ordered log of `(delegate index, operation, amount)` across meters.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<(usize, &'static str, f64)>>>);

impl Journal {
    fn push(&self, index: usize, op: &'static str, amount: f64) {
        self.0.lock().push((index, op, amount));
    }

    pub fn entries(&self) -> Vec<(usize, &'static str, f64)> {
        self.0.lock().clone()
    }
}

pub struct RecordingCounter {
    id: Id,
    index: usize,
    journal: Journal,
    value: Mutex<f64>,
    panics: AtomicBool,
}

impl RecordingCounter {
    pub fn new(journal: Journal, index: usize) -> Self {
        Self {
            id: Id::new("recording.counter"),
            index,
            journal,
            value: Mutex::new(0.0),
            panics: AtomicBool::new(false),
        }
    }

    pub fn panic_on_write(&self) {
        self.panics.store(true, Ordering::SeqCst);
    }
}

impl Meter for RecordingCounter {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        let value = *self.value.lock();
        vec![Measurement::new(self.id.clone(), 0, value)].into_iter()
    }
}

impl Counter for RecordingCounter {
    fn add(&self, amount: f64) {
        if self.panics.load(Ordering::SeqCst) {
            panic!("delegate {} failed", self.index);
        }
        *self.value.lock() += amount;
        self.journal.push(self.index, "add", amount);
    }

    fn count(&self) -> f64 {
        *self.value.lock()
    }
}

pub struct RecordingTimer {
    id: Id,
    index: usize,
    journal: Journal,
    clock: Arc<dyn Clock>,
    recorded: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    pub fn new(journal: Journal, index: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            id: Id::new("recording.timer"),
            index,
            journal,
            clock,
            recorded: Mutex::new(Vec::new()),
        }
    }
}

impl Meter for RecordingTimer {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        let recorded = self.recorded.lock().len() as f64;
        vec![Measurement::new(self.id.clone(), 0, recorded)].into_iter()
    }
}

impl Timer for RecordingTimer {
    fn record(&self, amount: Duration) {
        self.recorded.lock().push(amount);
        self.journal
            .push(self.index, "record", amount.as_nanos() as f64);
    }

    fn count(&self) -> u64 {
        self.recorded.lock().len() as u64
    }

    fn total_time(&self) -> Duration {
        self.recorded.lock().iter().sum()
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

pub struct RecordingSummary {
    id: Id,
    index: usize,
    journal: Journal,
    recorded: Mutex<Vec<u64>>,
}

impl RecordingSummary {
    pub fn new(journal: Journal, index: usize) -> Self {
        Self {
            id: Id::new("recording.summary"),
            index,
            journal,
            recorded: Mutex::new(Vec::new()),
        }
    }
}

impl Meter for RecordingSummary {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        let recorded = self.recorded.lock().len() as f64;
        vec![Measurement::new(self.id.clone(), 0, recorded)].into_iter()
    }
}

impl DistributionSummary for RecordingSummary {
    fn record(&self, amount: u64) {
        self.recorded.lock().push(amount);
        self.journal.push(self.index, "record", amount as f64);
    }

    fn count(&self) -> u64 {
        self.recorded.lock().len() as u64
    }

    fn total_amount(&self) -> u64 {
        self.recorded.lock().iter().sum()
    }
}
