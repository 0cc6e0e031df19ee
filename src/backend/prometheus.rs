//! Prometheus backend
//!
//! Meters backed by `prometheus` collectors registered in a dedicated
//! `prometheus::Registry`, so the same instrumentation can be scraped in the
//! text exposition format while also feeding the sidecar exporter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, Opts, TextEncoder};
use tracing::{debug, warn};

use super::atomic::{AtomicCounter, AtomicDistributionSummary, AtomicTimer};
use super::stat_id;
use crate::api::{
    Clock, Counter, DistributionSummary, Id, Measurement, Measurements, Meter, MeterFactory,
    Statistic, Timer,
};
use crate::error::{Error, Result};

/// Buckets for distribution summaries: powers of four from 1 to 4^11.
fn amount_buckets() -> Vec<f64> {
    (0..12).map(|i| 4f64.powi(i)).collect()
}

/// Replace every character Prometheus does not accept in names with `_`.
fn sanitize(raw: &str, allow_colon: bool) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn metric_name(id: &Id, suffix: &str) -> String {
    format!("{}{}", sanitize(id.name(), true), suffix)
}

fn const_labels(id: &Id) -> HashMap<String, String> {
    id.tags()
        .iter()
        .map(|t| (sanitize(t.key(), false), t.value().to_string()))
        .collect()
}

// =============================================================================
// Counter
// =============================================================================

pub struct PrometheusCounter {
    id: Id,
    count_id: Id,
    clock: Arc<dyn Clock>,
    inner: prometheus::Counter,
}

impl Meter for PrometheusCounter {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        vec![Measurement::new(
            self.count_id.clone(),
            self.clock.wall_time(),
            self.inner.get(),
        )]
        .into_iter()
    }
}

impl Counter for PrometheusCounter {
    fn add(&self, amount: f64) {
        // prometheus counters only go up
        if amount > 0.0 {
            self.inner.inc_by(amount);
        } else {
            debug!(id = %self.id, amount, "Ignoring non-positive counter increment");
        }
    }

    fn count(&self) -> f64 {
        self.inner.get()
    }
}

// =============================================================================
// Timer
// =============================================================================

pub struct PrometheusTimer {
    id: Id,
    count_id: Id,
    total_id: Id,
    clock: Arc<dyn Clock>,
    histogram: Histogram,
}

impl Meter for PrometheusTimer {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        let now = self.clock.wall_time();
        vec![
            Measurement::new(
                self.count_id.clone(),
                now,
                self.histogram.get_sample_count() as f64,
            ),
            Measurement::new(self.total_id.clone(), now, self.histogram.get_sample_sum()),
        ]
        .into_iter()
    }
}

impl Timer for PrometheusTimer {
    fn record(&self, amount: Duration) {
        self.histogram.observe(amount.as_secs_f64());
    }

    fn count(&self) -> u64 {
        self.histogram.get_sample_count()
    }

    fn total_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.histogram.get_sample_sum())
            .unwrap_or(Duration::ZERO)
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

// =============================================================================
// Distribution Summary
// =============================================================================

pub struct PrometheusDistributionSummary {
    id: Id,
    count_id: Id,
    total_id: Id,
    clock: Arc<dyn Clock>,
    histogram: Histogram,
}

impl Meter for PrometheusDistributionSummary {
    fn id(&self) -> &Id {
        &self.id
    }

    fn measure(&self) -> Measurements {
        let now = self.clock.wall_time();
        vec![
            Measurement::new(
                self.count_id.clone(),
                now,
                self.histogram.get_sample_count() as f64,
            ),
            Measurement::new(self.total_id.clone(), now, self.histogram.get_sample_sum()),
        ]
        .into_iter()
    }
}

impl DistributionSummary for PrometheusDistributionSummary {
    fn record(&self, amount: u64) {
        self.histogram.observe(amount as f64);
    }

    fn count(&self) -> u64 {
        self.histogram.get_sample_count()
    }

    fn total_amount(&self) -> u64 {
        self.histogram.get_sample_sum() as u64
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Backend building Prometheus-backed meters.
///
/// Clone the factory before handing it to a [`Registry`](crate::api::Registry)
/// to keep access to [`gather_text`](Self::gather_text).
#[derive(Clone, Default)]
pub struct PrometheusFactory {
    registry: prometheus::Registry,
}

impl PrometheusFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing Prometheus registry, e.g. one already served over HTTP.
    pub fn with_registry(registry: prometheus::Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &prometheus::Registry {
        &self.registry
    }

    /// Render every registered collector in the text exposition format.
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics output is not UTF-8: {}", e)))
    }

    /// Register a collector; a conflict leaves the meter working but unexposed.
    fn register(&self, id: &Id, collector: Box<dyn Collector>) {
        if let Err(e) = self.registry.register(collector) {
            warn!(id = %id, error = %e, "Failed to register Prometheus collector");
        }
    }

    fn histogram(&self, id: &Id, name: String, buckets: Vec<f64>) -> prometheus::Result<Histogram> {
        let opts = HistogramOpts::new(name, id.to_string())
            .const_labels(const_labels(id))
            .buckets(buckets);
        Histogram::with_opts(opts)
    }
}

impl fmt::Debug for PrometheusFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusFactory").finish()
    }
}

impl MeterFactory for PrometheusFactory {
    fn new_counter(&self, id: Id, clock: Arc<dyn Clock>) -> Arc<dyn Counter> {
        let opts = Opts::new(metric_name(&id, ""), id.to_string())
            .const_labels(const_labels(&id));
        match prometheus::Counter::with_opts(opts) {
            Ok(inner) => {
                self.register(&id, Box::new(inner.clone()));
                Arc::new(PrometheusCounter {
                    count_id: stat_id(&id, Statistic::Count),
                    id,
                    clock,
                    inner,
                })
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Cannot express id as Prometheus counter, keeping it in memory");
                Arc::new(AtomicCounter::new(id, clock))
            }
        }
    }

    fn new_timer(&self, id: Id, clock: Arc<dyn Clock>) -> Arc<dyn Timer> {
        let name = metric_name(&id, "_seconds");
        match self.histogram(&id, name, prometheus::DEFAULT_BUCKETS.to_vec()) {
            Ok(histogram) => {
                self.register(&id, Box::new(histogram.clone()));
                Arc::new(PrometheusTimer {
                    count_id: stat_id(&id, Statistic::Count),
                    total_id: stat_id(&id, Statistic::TotalTime),
                    id,
                    clock,
                    histogram,
                })
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Cannot express id as Prometheus histogram, keeping it in memory");
                Arc::new(AtomicTimer::new(id, clock))
            }
        }
    }

    fn new_distribution_summary(
        &self,
        id: Id,
        clock: Arc<dyn Clock>,
    ) -> Arc<dyn DistributionSummary> {
        let name = metric_name(&id, "");
        match self.histogram(&id, name, amount_buckets()) {
            Ok(histogram) => {
                self.register(&id, Box::new(histogram.clone()));
                Arc::new(PrometheusDistributionSummary {
                    count_id: stat_id(&id, Statistic::Count),
                    total_id: stat_id(&id, Statistic::TotalAmount),
                    id,
                    clock,
                    histogram,
                })
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Cannot express id as Prometheus histogram, keeping it in memory");
                Arc::new(AtomicDistributionSummary::new(id, clock))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ManualClock, Registry, TimerExt};

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(42, 0))
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("spark.shuffle.read", true), "spark_shuffle_read");
        assert_eq!(sanitize("jvm:gc", true), "jvm:gc");
        assert_eq!(sanitize("jvm:gc", false), "jvm_gc");
        assert_eq!(sanitize("9lives", false), "_9lives");
        assert_eq!(sanitize("", false), "_");
    }

    #[test]
    fn test_counter_is_exposed() {
        let factory = PrometheusFactory::new();
        let counter = factory.new_counter(
            Id::new("http.requests").with_tag("status", "200"),
            clock(),
        );
        counter.add(3.0);
        counter.add(-1.0);

        assert_eq!(counter.count(), 3.0);
        let text = factory.gather_text().unwrap();
        assert!(text.contains("http_requests{status=\"200\"} 3"));
    }

    #[test]
    fn test_timer_measure() {
        let factory = PrometheusFactory::new();
        let timer = factory.new_timer(Id::new("db.query"), clock());
        timer.record(Duration::from_millis(500));
        timer.record(Duration::from_millis(1500));

        assert_eq!(timer.count(), 2);
        assert_eq!(timer.total_time(), Duration::from_secs(2));

        let ms: Vec<Measurement> = timer.measure().collect();
        assert_eq!(ms.len(), 2);
        assert_eq!(ms[1].value(), 2.0);
        assert_eq!(ms[1].id().tag("statistic"), Some("totalTime"));
        assert!(factory
            .gather_text()
            .unwrap()
            .contains("db_query_seconds_count 2"));
    }

    #[test]
    fn test_summary_totals() {
        let factory = PrometheusFactory::new();
        let summary = factory.new_distribution_summary(Id::new("payload.bytes"), clock());
        summary.record(10);
        summary.record(90);

        assert_eq!(summary.count(), 2);
        assert_eq!(summary.total_amount(), 100);
    }

    #[test]
    fn test_conflicting_label_sets_still_count() {
        let factory = PrometheusFactory::new();
        let a = factory.new_counter(Id::new("jobs").with_tag("queue", "a"), clock());
        let b = factory.new_counter(Id::new("jobs").with_tag("worker", "b"), clock());
        a.increment();
        b.increment();

        assert_eq!(a.count(), 1.0);
        assert_eq!(b.count(), 1.0);
    }

    #[test]
    fn test_registry_over_prometheus() {
        let factory = PrometheusFactory::new();
        let registry = Registry::with_clock(factory.clone(), clock());

        let timer = registry.timer_named("render");
        timer.record_fn(|| ());

        assert_eq!(registry.timer_named("render").count(), 1);
        assert!(factory
            .gather_text()
            .unwrap()
            .contains("render_seconds_count 1"));
    }
}
