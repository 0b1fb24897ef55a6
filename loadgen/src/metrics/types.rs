//! Metric kinds and read-only snapshot values

use hdrhistogram::Histogram;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::time::Duration;

/// Kind of a registered metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Fraction of boolean samples that were true
    Rate,
    /// Monotonic cumulative sum
    Counter,
    /// Latency distribution
    Trend,
}

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Rate => "rate",
            MetricKind::Counter => "counter",
            MetricKind::Trend => "trend",
        }
    }
}

/// Point-in-time copy of a latency histogram (microsecond resolution)
#[derive(Debug, Clone)]
pub struct TrendSnapshot {
    histogram: Histogram<u64>,
}

impl TrendSnapshot {
    pub(crate) fn new(histogram: Histogram<u64>) -> Self {
        Self { histogram }
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Latency at percentile `p` (0-100), in milliseconds
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let micros = self.histogram.value_at_percentile(p.clamp(0.0, 100.0));
        Some(micros as f64 / 1000.0)
    }

    pub fn percentile(&self, p: f64) -> Option<Duration> {
        self.percentile_ms(p)
            .map(|ms| Duration::from_micros((ms * 1000.0) as u64))
    }

    pub fn mean_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.histogram.mean() / 1000.0)
    }

    pub fn min_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.histogram.min() as f64 / 1000.0)
    }

    pub fn max_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.histogram.max() as f64 / 1000.0)
    }
}

impl PartialEq for TrendSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.histogram == other.histogram
    }
}

impl Serialize for TrendSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TrendSnapshot", 7)?;
        state.serialize_field("count", &self.count())?;
        state.serialize_field("avg_ms", &self.mean_ms())?;
        state.serialize_field("min_ms", &self.min_ms())?;
        state.serialize_field("med_ms", &self.percentile_ms(50.0))?;
        state.serialize_field("p95_ms", &self.percentile_ms(95.0))?;
        state.serialize_field("p99_ms", &self.percentile_ms(99.0))?;
        state.serialize_field("max_ms", &self.max_ms())?;
        state.end()
    }
}

/// Value of one metric at snapshot time
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricValue {
    Rate { trues: u64, total: u64 },
    Counter { count: u64 },
    Trend(TrendSnapshot),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Rate { .. } => MetricKind::Rate,
            MetricValue::Counter { .. } => MetricKind::Counter,
            MetricValue::Trend(_) => MetricKind::Trend,
        }
    }

    /// `trues / total`; zero when no samples were recorded
    pub fn rate(&self) -> Option<f64> {
        match self {
            MetricValue::Rate { trues, total } => Some(if *total == 0 {
                0.0
            } else {
                *trues as f64 / *total as f64
            }),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            MetricValue::Counter { count } => Some(*count),
            _ => None,
        }
    }

    pub fn trend(&self) -> Option<&TrendSnapshot> {
        match self {
            MetricValue::Trend(trend) => Some(trend),
            _ => None,
        }
    }
}

/// Read-only view of every metric, ordered by name
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    metrics: IndexMap<String, MetricValue>,
}

impl Snapshot {
    pub(crate) fn from_unordered(mut entries: Vec<(String, MetricValue)>) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            metrics: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::rate)
    }

    pub fn count(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(MetricValue::count)
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSnapshot> {
        self.get(name).and_then(MetricValue::trend)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
