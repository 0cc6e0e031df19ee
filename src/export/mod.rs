//! Sidecar Export
//!
//! ```text
//! Registry ──collect()──► Vec<Measurement> ──json──► payload ──sink──► sidecar
//!              (finite only)                        (JSON array)    (HTTP POST, 200)
//! ```
//!
//! [`SidecarExporter`] owns the schedule, [`json`] the wire format and
//! [`MeasurementSink`] the transport.

mod exporter;
pub mod json;
mod sink;

#[cfg(test)]
mod proptest;

pub use exporter::{ExporterConfig, SidecarExporter, NUM_MEASUREMENTS, NUM_MESSAGES};
pub use json::{to_payload, write_payload};
pub use sink::{HttpSink, MeasurementSink};
