//! Concurrent metrics registry
//!
//! Every virtual user writes into the same registry instance, so all write
//! paths are lock-free except the latency histogram:
//! - the name map is sharded (`DashMap`)
//! - rates and counters are plain atomics
//! - trends use an HDR histogram behind a short `parking_lot` lock
//!
//! Rates store the total before the true count and read in the opposite
//! order, so a snapshot never observes `trues > total`.

use super::types::{MetricKind, MetricValue, Snapshot, TrendSnapshot};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hdrhistogram::{CreationError, Histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Significant figures kept by trend histograms
const TREND_PRECISION: u8 = 3;

/// Largest trackable latency (one hour, in microseconds); longer samples clamp
const TREND_MAX_MICROS: u64 = 3_600_000_000;

#[derive(Debug, Default)]
struct RateCell {
    trues: AtomicU64,
    total: AtomicU64,
}

#[derive(Debug)]
enum Metric {
    Rate(RateCell),
    Counter(AtomicU64),
    Trend(Mutex<Histogram<u64>>),
}

impl Metric {
    fn new(kind: MetricKind) -> Result<Self, CreationError> {
        Ok(match kind {
            MetricKind::Rate => Metric::Rate(RateCell::default()),
            MetricKind::Counter => Metric::Counter(AtomicU64::new(0)),
            MetricKind::Trend => Metric::Trend(Mutex::new(new_histogram()?)),
        })
    }

    fn kind(&self) -> MetricKind {
        match self {
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }

    fn value(&self) -> MetricValue {
        match self {
            Metric::Rate(cell) => {
                let trues = cell.trues.load(Ordering::SeqCst);
                let total = cell.total.load(Ordering::SeqCst);
                MetricValue::Rate { trues, total }
            }
            Metric::Counter(count) => MetricValue::Counter {
                count: count.load(Ordering::SeqCst),
            },
            Metric::Trend(histogram) => {
                MetricValue::Trend(TrendSnapshot::new(histogram.lock().clone()))
            }
        }
    }
}

/// Fixed-range histogram: `saturating_record` clamps to the upper bound
/// instead of the (tiny) initial range of an auto-resizing one
fn new_histogram() -> Result<Histogram<u64>, CreationError> {
    Histogram::new_with_bounds(1, TREND_MAX_MICROS, TREND_PRECISION)
}

/// Registry of named rate, counter and trend metrics
///
/// Shared by reference (`Arc<MetricsRegistry>`) between the executor, the
/// check evaluator and the threshold judge. There is no global instance.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: DashMap<String, Arc<Metric>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn metric(&self, name: &str, kind: MetricKind) -> Option<Arc<Metric>> {
        let metric = match self.metrics.get(name) {
            Some(existing) => existing.clone(),
            None => match self.metrics.entry(name.to_owned()) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => match Metric::new(kind) {
                    Ok(metric) => entry.insert(Arc::new(metric)).clone(),
                    Err(e) => {
                        warn!(metric = name, error = %e, "Failed to create metric");
                        return None;
                    }
                },
            },
        };

        if metric.kind() != kind {
            warn!(
                metric = name,
                registered = metric.kind().name(),
                requested = kind.name(),
                "Dropping sample recorded with the wrong metric kind"
            );
            return None;
        }
        Some(metric)
    }

    /// Add one boolean sample to a rate metric
    pub fn record_rate(&self, name: &str, sample: bool) {
        if let Some(metric) = self.metric(name, MetricKind::Rate)
            && let Metric::Rate(cell) = metric.as_ref()
        {
            cell.total.fetch_add(1, Ordering::SeqCst);
            if sample {
                cell.trues.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Add `delta` to a counter metric
    pub fn increment_counter(&self, name: &str, delta: u64) {
        if let Some(metric) = self.metric(name, MetricKind::Counter)
            && let Metric::Counter(count) = metric.as_ref()
        {
            count.fetch_add(delta, Ordering::SeqCst);
        }
    }

    /// Record one latency sample into a trend metric
    pub fn record_trend(&self, name: &str, latency: Duration) {
        if let Some(metric) = self.metric(name, MetricKind::Trend)
            && let Metric::Trend(histogram) = metric.as_ref()
        {
            let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            histogram.lock().saturating_record(micros.max(1));
        }
    }

    /// Declare a metric without recording a sample, so it shows up in
    /// snapshots (and thresholds) even if nothing is ever recorded
    pub fn register(&self, name: &str, kind: MetricKind) {
        let _ = self.metric(name, kind);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Copy the current value of every metric
    pub fn snapshot(&self) -> Snapshot {
        let entries = self
            .metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().value()))
            .collect();
        Snapshot::from_unordered(entries)
    }
}
