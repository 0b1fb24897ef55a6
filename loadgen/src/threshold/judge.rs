//! Evaluates thresholds against a metrics snapshot

use super::expr::{Aggregation, Threshold};
use crate::metrics::{MetricValue, Snapshot};
use serde::Serialize;

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    /// Expression part, e.g. `p(95)<500`
    pub expression: String,
    /// `None` when the metric is missing, empty, or of an unsupported kind
    pub observed: Option<f64>,
    pub expected: f64,
    pub passed: bool,
}

/// AND of every threshold result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub results: Vec<ThresholdResult>,
}

impl Verdict {
    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Value of `metric` under `aggregation`, if the aggregation applies
fn observe(value: &MetricValue, aggregation: Aggregation) -> Option<f64> {
    match (aggregation, value) {
        (Aggregation::Rate, MetricValue::Rate { .. }) => value.rate(),
        (Aggregation::Count, MetricValue::Counter { count }) => Some(*count as f64),
        (Aggregation::Percentile(p), MetricValue::Trend(trend)) => trend.percentile_ms(p),
        (Aggregation::Median, MetricValue::Trend(trend)) => trend.percentile_ms(50.0),
        (Aggregation::Avg, MetricValue::Trend(trend)) => trend.mean_ms(),
        (Aggregation::Min, MetricValue::Trend(trend)) => trend.min_ms(),
        (Aggregation::Max, MetricValue::Trend(trend)) => trend.max_ms(),
        _ => None,
    }
}

/// Compare every threshold with the snapshot
pub fn judge(snapshot: &Snapshot, thresholds: &[Threshold]) -> Verdict {
    let results: Vec<ThresholdResult> = thresholds
        .iter()
        .map(|threshold| {
            let observed = snapshot
                .get(&threshold.metric)
                .and_then(|value| observe(value, threshold.aggregation));
            let passed = observed.is_some_and(|v| threshold.operator.compare(v, threshold.bound));
            ThresholdResult {
                metric: threshold.metric.clone(),
                expression: threshold.expression(),
                observed,
                expected: threshold.bound,
                passed,
            }
        })
        .collect();

    Verdict {
        passed: results.iter().all(|r| r.passed),
        results,
    }
}
