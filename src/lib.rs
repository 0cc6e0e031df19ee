//! tagmeter - Tagged Metrics Facade
//!
//! Records counts, timings and value distributions against named, tagged
//! identifiers, fans them out to one or more metric backends and exports the
//! aggregated measurements to a sidecar process over HTTP.
//!
//! # Architecture
//!
//! ```text
//! flat name ──► NameTranslator ──► Id ──► Registry ──► Composite meter ──► backends
//!                                            │
//!                                            └──► SidecarExporter ──► JSON ──► sidecar
//! ```
//!
//! # Modules
//!
//! - [`api`] - Identifiers, meter traits, composites and the registry
//! - [`backend`] - In-memory atomic and Prometheus meter backends
//! - [`error`] - Error types
//! - [`export`] - Scheduled export to the sidecar
//! - [`translate`] - Pattern-based name translation

pub mod api;
pub mod backend;
pub mod error;
pub mod export;
pub mod translate;

// Re-export commonly used types
pub use api::{Counter, DistributionSummary, Id, Measurement, Registry, Tag, Timer, TimerExt};
pub use backend::{AtomicFactory, PrometheusFactory};
pub use error::{Error, Result};
pub use export::{ExporterConfig, HttpSink, MeasurementSink, SidecarExporter};
pub use translate::{NamePattern, NameTranslator, Translation};
