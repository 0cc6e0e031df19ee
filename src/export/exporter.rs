//! Sidecar Exporter
//!
//! Periodically walks a [`Registry`], drops non-finite measurements and posts
//! the rest to a sidecar process. The exporter runs on its own named thread
//! with a single-threaded Tokio runtime, so slow deliveries never block the
//! threads that record metrics.
//!
//! Scheduling is fixed-delay: the next cycle starts one period after the
//! previous one finished, and the first cycle runs one period after start.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::json;
use super::sink::{HttpSink, MeasurementSink};
use crate::api::{Id, Measurement, Registry};
use crate::error::{Error, Result};

/// Counts successful deliveries.
pub const NUM_MESSAGES: &str = "tagmeter.sidecar.numMessages";

/// Counts measurements delivered.
pub const NUM_MEASUREMENTS: &str = "tagmeter.sidecar.numMeasurements";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the sidecar exporter
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Timeout for one HTTP post
    pub request_timeout: Duration,

    /// Name of the worker thread
    pub thread_name: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            thread_name: "tagmeter-sidecar".to_string(),
        }
    }
}

// =============================================================================
// Exporter
// =============================================================================

/// A stopped worker stays here until its thread exits, so a restart cannot
/// overlap the last cycle of the previous worker.
struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping sidecar exporter");
            self.cancel.cancel();
        }
    }
}

/// Exports every meter of a registry to a sidecar.
///
/// The worker thread only holds a weak reference, so dropping the last
/// handle stops it like [`stop`](Self::stop) does.
pub struct SidecarExporter {
    registry: Arc<Registry>,
    config: ExporterConfig,
    num_messages: Id,
    num_measurements: Id,
    worker: Mutex<Option<Worker>>,
}

impl SidecarExporter {
    /// Create an exporter for `registry`. Nothing runs until [`start`](Self::start).
    pub fn new(registry: Arc<Registry>, config: ExporterConfig) -> Arc<Self> {
        Arc::new(Self {
            num_messages: registry.create_id(NUM_MESSAGES),
            num_measurements: registry.create_id(NUM_MEASUREMENTS),
            registry,
            config,
            worker: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Snapshot every meter and keep the finite measurements, in registry
    /// order and then meter order.
    pub fn collect(&self) -> Vec<Measurement> {
        self.registry
            .meters()
            .iter()
            .flat_map(|meter| meter.measure())
            .filter(Measurement::is_finite)
            .collect()
    }

    /// Run one collection and delivery. Returns the number of measurements
    /// sent; nothing is sent when there is nothing finite to report.
    pub async fn export_once(&self, sink: &dyn MeasurementSink) -> Result<usize> {
        let measurements = self.collect();
        self.deliver(sink, measurements).await
    }

    async fn deliver(
        &self,
        sink: &dyn MeasurementSink,
        measurements: Vec<Measurement>,
    ) -> Result<usize> {
        if measurements.is_empty() {
            debug!("No measurements to send");
            return Ok(0);
        }

        let count = measurements.len();
        let payload = json::to_payload(&measurements)?;
        sink.send(payload, count).await?;

        self.registry.counter(&self.num_messages).increment();
        self.registry
            .counter(&self.num_measurements)
            .add(count as f64);
        Ok(count)
    }

    /// Start posting to `endpoint` every `period`.
    pub fn start(self: &Arc<Self>, endpoint: &str, period: Duration) -> Result<()> {
        let sink = HttpSink::new(endpoint, self.config.request_timeout)?;
        info!(url = %sink.url(), ?period, "Starting sidecar exporter");
        self.start_with_sink(Arc::new(sink), period)
    }

    /// Start delivering to `sink` every `period`.
    ///
    /// Fails with [`Error::ExporterRunning`] while a worker is scheduled, and
    /// also while a stopped worker is still finishing its last cycle.
    pub fn start_with_sink(
        self: &Arc<Self>,
        sink: Arc<dyn MeasurementSink>,
        period: Duration,
    ) -> Result<()> {
        if period.is_zero() {
            return Err(Error::Config("Poll period must be greater than zero".to_string()));
        }

        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Err(Error::ExporterRunning);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let cancel = CancellationToken::new();

        let exporter = Arc::downgrade(self);
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || runtime.block_on(Self::run(exporter, sink, period, token)))?;

        *worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Stop scheduling cycles. A cycle already in flight finishes on its own.
    /// Calling this more than once, or before `start`, does nothing.
    pub fn stop(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.cancel();
        }
    }

    /// Stop scheduling cycles and block until the worker thread has exited,
    /// including any cycle in flight.
    pub fn shutdown(&self) {
        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            return;
        };
        worker.cancel();

        if worker.handle.thread().id() == thread::current().id() {
            return;
        }
        if worker.handle.join().is_err() {
            error!("Sidecar exporter worker panicked");
        }
    }

    /// True while a worker is scheduled.
    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(Worker::is_alive)
    }

    async fn run(
        exporter: Weak<Self>,
        sink: Arc<dyn MeasurementSink>,
        period: Duration,
        cancel: CancellationToken,
    ) {
        debug!(?period, "Sidecar exporter worker started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
            let Some(exporter) = exporter.upgrade() else {
                break;
            };
            exporter.run_cycle(sink.as_ref()).await;
        }

        debug!("Sidecar exporter worker stopped");
    }

    /// One scheduled cycle. Never fails; errors and panics are logged and the
    /// next cycle runs as usual.
    async fn run_cycle(&self, sink: &dyn MeasurementSink) {
        let cycle = AssertUnwindSafe(self.export_once(sink)).catch_unwind();
        match cycle.await {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => debug!(count, "Sent measurements to sidecar"),
            Ok(Err(e)) => warn!(error = %e, "Failed to send measurements to sidecar"),
            Err(_) => error!("Export cycle panicked, skipping to the next cycle"),
        }
    }
}

impl Drop for SidecarExporter {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}
