//! End-of-run summary

use crate::config::TestType;
use crate::metrics::{MetricValue, Snapshot, TrendSnapshot};
use crate::scenario::ScenarioKind;
use crate::scheduler::{ScheduleReport, StopReason};
use crate::threshold::Verdict;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

fn duration_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Everything a run produced, for the console and for CI
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub scenario: ScenarioKind,
    pub test_type: TestType,
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_secs", serialize_with = "duration_secs")]
    pub duration: Duration,
    pub peak_vus: u64,
    pub vus_spawned: u64,
    pub vus_aborted: u64,
    pub iterations: u64,
    pub stop_reason: StopReason,
    pub metrics: Snapshot,
    pub verdict: Verdict,
}

impl RunSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: Uuid,
        scenario: ScenarioKind,
        test_type: TestType,
        base_url: impl Into<String>,
        started_at: DateTime<Utc>,
        schedule: &ScheduleReport,
        metrics: Snapshot,
        verdict: Verdict,
    ) -> Self {
        Self {
            run_id,
            scenario,
            test_type,
            base_url: base_url.into(),
            started_at,
            duration: schedule.elapsed,
            peak_vus: schedule.peak_vus,
            vus_spawned: schedule.vus_spawned,
            vus_aborted: schedule.vus_aborted,
            iterations: schedule.iterations,
            stop_reason: schedule.stop_reason,
            metrics,
            verdict,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.passed
    }

    /// Generate JSON output for CI
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn print_summary(&self) {
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " RUN: {} ({:?}) against {}",
            self.scenario, self.test_type, self.base_url
        );
        println!("═══════════════════════════════════════════════════════════════");
        println!();
        println!("   Run id:       {}", self.run_id);
        println!("   Started:      {}", self.started_at.to_rfc3339());
        println!("   Duration:     {:.1}s", self.duration.as_secs_f64());
        println!(
            "   VUs:          peak {} | spawned {} | aborted {}",
            self.peak_vus, self.vus_spawned, self.vus_aborted
        );
        println!("   Iterations:   {}", self.iterations);
        println!("   Stopped:      {:?}", self.stop_reason);

        println!();
        println!(" ─── Metrics ─────────────────────────────────────────────────");
        println!();
        for (name, value) in self.metrics.iter() {
            println!("   {:32} {}", name, format_metric(value));
        }

        if !self.verdict.results.is_empty() {
            println!();
            println!(" ─── Thresholds ──────────────────────────────────────────────");
            println!();
            for result in &self.verdict.results {
                let observed = result
                    .observed
                    .map(|v| format!("{v:.3}"))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "   {} {:24} {:16} observed {}",
                    if result.passed { "✓" } else { "✗" },
                    result.metric,
                    result.expression,
                    observed
                );
            }
        }

        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " OVERALL: {}",
            if self.passed() {
                "PASS"
            } else {
                "FAIL (threshold breached)"
            }
        );
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

fn format_metric(value: &MetricValue) -> String {
    match value {
        MetricValue::Rate { trues, total } => format!(
            "{:.2}% ({} / {})",
            value.rate().unwrap_or(0.0) * 100.0,
            trues,
            total
        ),
        MetricValue::Counter { count } => count.to_string(),
        MetricValue::Trend(trend) => format_trend(trend),
    }
}

fn format_trend(trend: &TrendSnapshot) -> String {
    if trend.is_empty() {
        return "no samples".to_string();
    }
    let ms = |v: Option<f64>| v.map(|v| format!("{v:.1}ms")).unwrap_or_default();
    format!(
        "avg={} min={} med={} p(95)={} p(99)={} max={}",
        ms(trend.mean_ms()),
        ms(trend.min_ms()),
        ms(trend.percentile_ms(50.0)),
        ms(trend.percentile_ms(95.0)),
        ms(trend.percentile_ms(99.0)),
        ms(trend.max_ms()),
    )
}
