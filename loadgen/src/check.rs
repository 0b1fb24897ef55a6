//! Response checks
//!
//! A check is a named boolean assertion on one response. Checks never change
//! the control flow of an iteration: each outcome becomes one sample of a
//! rate metric named after the check, plus one sample of the aggregate
//! `checks` rate.

use crate::metrics::{MetricsRegistry, names};
use crate::transport::{DecodeError, HttpResponse};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Predicate = dyn Fn(&HttpResponse) -> Result<bool, DecodeError> + Send + Sync;

/// A named predicate over a response
#[derive(Clone)]
pub struct Check {
    name: String,
    predicate: Arc<Predicate>,
}

impl Check {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&HttpResponse) -> Result<bool, DecodeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// `status is <code>`
    pub fn status_is(code: u16) -> Self {
        Self::new(format!("status is {code}"), move |r| Ok(r.status == code))
    }

    /// Passes when the response arrived strictly faster than `limit`
    pub fn latency_below(name: impl Into<String>, limit: Duration) -> Self {
        Self::new(name, move |r| Ok(r.latency < limit))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the predicate; decode failures count as `false`
    pub fn evaluate(&self, response: &HttpResponse) -> bool {
        (self.predicate)(response).unwrap_or(false)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

/// Outcome counts of one evaluation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckTally {
    pub passed: usize,
    pub failed: usize,
}

impl CheckTally {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Checks applied together to one response
#[derive(Debug, Clone, Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter()
    }

    /// Evaluate every check independently and record each outcome
    pub fn evaluate(&self, response: &HttpResponse, registry: &MetricsRegistry) -> CheckTally {
        self.record(registry, |check| check.evaluate(response))
    }

    /// Record every check as failed, for a step that produced no response
    pub fn fail_all(&self, registry: &MetricsRegistry) -> CheckTally {
        self.record(registry, |_| false)
    }

    fn record(&self, registry: &MetricsRegistry, outcome: impl Fn(&Check) -> bool) -> CheckTally {
        let mut tally = CheckTally::default();
        for check in &self.checks {
            let ok = outcome(check);
            registry.record_rate(check.name(), ok);
            registry.record_rate(names::CHECKS, ok);
            if ok {
                tally.passed += 1;
            } else {
                tally.failed += 1;
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct OrderBody {
        #[serde(rename = "orderId")]
        order_id: i64,
    }

    fn has_order_data() -> Check {
        Check::new("has order data", |r| {
            Ok(r.status == 200 && r.json::<OrderBody>()?.order_id > 0)
        })
    }

    fn response(status: u16, body: &'static str, ms: u64) -> HttpResponse {
        HttpResponse::new(status, body, Duration::from_millis(ms))
    }

    #[test]
    fn test_status_check() {
        assert!(Check::status_is(200).evaluate(&response(200, "{}", 5)));
        assert!(!Check::status_is(200).evaluate(&response(409, "{}", 5)));
        assert_eq!(Check::status_is(200).name(), "status is 200");
    }

    #[test]
    fn test_latency_check_is_strict() {
        let check = Check::latency_below("response time < 500ms", Duration::from_millis(500));
        assert!(check.evaluate(&response(200, "{}", 499)));
        assert!(!check.evaluate(&response(200, "{}", 500)));
    }

    #[test]
    fn test_decode_failure_evaluates_false() {
        let check = has_order_data();
        assert!(check.evaluate(&response(200, r#"{"orderId": 7}"#, 1)));
        assert!(!check.evaluate(&response(200, "not json", 1)));
        assert!(!check.evaluate(&response(200, r#"{"id": 7}"#, 1)));
    }

    #[test]
    fn test_check_set_records_each_outcome() {
        let registry = MetricsRegistry::new();
        let checks = CheckSet::new()
            .with(Check::status_is(200))
            .with(Check::latency_below("response time < 1000ms", Duration::from_secs(1)))
            .with(has_order_data());

        let tally = checks.evaluate(&response(200, "<html>", 20), &registry);
        assert_eq!(tally, CheckTally { passed: 2, failed: 1 });
        assert!(!tally.all_passed());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.rate("status is 200"), Some(1.0));
        assert_eq!(snapshot.rate("has order data"), Some(0.0));
        assert!((snapshot.rate(names::CHECKS).unwrap() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_fail_all_records_false_for_every_check() {
        let registry = MetricsRegistry::new();
        let checks = CheckSet::new()
            .with(Check::status_is(200))
            .with(has_order_data());

        let tally = checks.fail_all(&registry);
        assert_eq!(tally, CheckTally { passed: 0, failed: 2 });

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.rate("status is 200"), Some(0.0));
        assert_eq!(snapshot.rate("has order data"), Some(0.0));
        assert_eq!(snapshot.rate(names::CHECKS), Some(0.0));
    }
}
