//! Instrumentation API
//!
//! Identifiers, measurements, meter capability traits, composites and the
//! registry that ties them together.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  call site: registry.counter(&id).increment()                 │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Registry (DashMap<Id, AnyMeter>)                             │
//! │    MeterFactory: Atomic │ Prometheus │ Noop │ Composite       │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  CompositeCounter / CompositeTimer / CompositeSummary         │
//! │    delegate[0] (reads) ── delegate[1] ── ... delegate[n-1]    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod clock;
mod composite;
mod id;
mod measurement;
mod meter;
mod noop;
mod registry;
mod testing;

#[cfg(test)]
mod proptest;

pub use clock::{Clock, ManualClock, SystemClock};
pub use composite::{CompositeCounter, CompositeDistributionSummary, CompositeTimer};
pub use id::{Id, Tag};
pub use measurement::{DataType, Measurement, Measurements, Statistic, STATISTIC_TAG, TYPE_TAG};
pub use meter::{AnyMeter, Counter, DistributionSummary, Meter, MeterKind, Timer, TimerExt};
pub use noop::{NoopCounter, NoopDistributionSummary, NoopFactory, NoopTimer};
pub use registry::{CompositeFactory, MeterFactory, Registry};

