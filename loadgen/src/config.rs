//! Load engine configuration
//!
//! Configuration is loaded from environment variables. Unset or unparsable
//! values keep their defaults.

use crate::scenario::{
    DEFAULT_ADDRESSES, DEFAULT_STEP_PAUSE, DEFAULT_THINK_TIME, InputDomain, PlanError,
    ScenarioKind, ScenarioPlan,
};
use crate::scheduler::{
    DEFAULT_GRACEFUL_STOP, DEFAULT_POLL_INTERVAL, Ramp, Stage, StageParseError, parse_stages,
};
use crate::threshold::{Aggregation, Operator, Threshold, ThresholdParseError, parse_thresholds};
use serde::Serialize;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid STAGES: {0}")]
    Stages(#[from] StageParseError),

    #[error("Invalid THRESHOLDS: {0}")]
    Thresholds(#[from] ThresholdParseError),

    #[error("Invalid scenario plan: {0}")]
    Plan(#[from] PlanError),
}

/// Main load engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Scenario to run
    pub scenario: ScenarioKind,
    /// Backend base URL
    pub base_url: String,
    /// User ids are sampled from `1..=total_users`
    pub total_users: u64,
    /// Coupon requested by the coupon-issue scenario
    pub coupon_id: u64,

    /// Pause between iterations of one VU
    pub think_time: Duration,
    /// Pause before each dependent step
    pub step_pause: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,

    /// Scheduler reconciliation period
    pub poll_interval: Duration,
    /// Grace period for busy VUs when the run ends
    pub graceful_stop: Duration,
    /// Seed for reproducible inputs; entropy when unset
    pub seed: Option<u64>,

    /// Stage override, e.g. `2m:100,30s:600`
    pub stages: Option<String>,
    /// Threshold override, e.g. `errors:rate<0.05;http_req_duration:p(95)<500`
    pub thresholds: Option<String>,
    /// Judge thresholds during the run as well as at the end
    pub threshold_check_interval: Option<Duration>,
    /// Stop the run as soon as a rolling judgment fails
    pub abort_on_fail: bool,

    /// Write the JSON summary to this path
    pub summary_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scenario: ScenarioKind::OrderCreate,
            base_url: "http://host.docker.internal:8080".to_string(),
            total_users: 1000,
            coupon_id: 1,
            think_time: DEFAULT_THINK_TIME,
            step_pause: DEFAULT_STEP_PAUSE,
            request_timeout: Duration::from_secs(60),
            poll_interval: DEFAULT_POLL_INTERVAL,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            seed: None,
            stages: None,
            thresholds: None,
            threshold_check_interval: None,
            abort_on_fail: false,
            summary_path: None,
        }
    }
}

fn millis(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Scenario
        if let Some(val) = non_empty("SCENARIO") {
            match val.parse() {
                Ok(kind) => config.scenario = kind,
                Err(e) => warn!(error = %e, "Ignoring SCENARIO"),
            }
        }
        if let Some(url) = non_empty("BASE_URL") {
            config.base_url = url;
        }
        if let Ok(val) = env::var("TOTAL_USERS")
            && let Ok(v) = val.parse()
        {
            config.total_users = v;
        }
        if let Ok(val) = env::var("COUPON_ID")
            && let Ok(v) = val.parse()
        {
            config.coupon_id = v;
        }

        // Pacing
        if let Some(d) = millis("THINK_TIME_MS") {
            config.think_time = d;
        }
        if let Some(d) = millis("STEP_PAUSE_MS") {
            config.step_pause = d;
        }
        if let Some(d) = secs("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = d;
        }

        // Scheduler
        if let Some(d) = millis("POLL_INTERVAL_MS") {
            config.poll_interval = d;
        }
        if let Some(d) = secs("GRACEFUL_STOP_SECS") {
            config.graceful_stop = d;
        }
        if let Ok(val) = env::var("SEED")
            && let Ok(seed) = val.parse()
        {
            config.seed = Some(seed);
        }

        // Profile overrides
        config.stages = non_empty("STAGES");
        config.thresholds = non_empty("THRESHOLDS");
        config.threshold_check_interval = secs("THRESHOLD_CHECK_INTERVAL_SECS")
            .filter(|d| !d.is_zero());
        if let Ok(val) = env::var("ABORT_ON_FAIL") {
            config.abort_on_fail = val.to_lowercase() == "true" || val == "1";
        }
        config.summary_path = non_empty("SUMMARY_PATH");

        config
    }

    /// Scenario profile with the STAGES and THRESHOLDS overrides applied
    pub fn load_profile(&self) -> Result<LoadProfile, ConfigError> {
        let mut profile = LoadProfile::for_scenario(self.scenario);
        if let Some(stages) = &self.stages {
            profile.ramp = parse_stages(stages)?;
        }
        if let Some(thresholds) = &self.thresholds {
            profile.thresholds = parse_thresholds(thresholds)?;
        }
        Ok(profile)
    }

    pub fn plan(&self) -> Result<ScenarioPlan, ConfigError> {
        Ok(ScenarioPlan::builtin(self.scenario, self.coupon_id)?
            .with_think_time(self.think_time)
            .with_step_pause(self.step_pause))
    }

    pub fn inputs(&self) -> InputDomain {
        InputDomain::new(
            self.total_users,
            DEFAULT_ADDRESSES.iter().map(|a| a.to_string()).collect(),
        )
    }
}

/// Kind of load a profile applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Ramp up, hold, ramp down
    Load,
    /// Baseline, sudden spike, hold, recover
    Peak,
}

/// Stages and thresholds for one scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadProfile {
    pub scenario: ScenarioKind,
    pub test_type: TestType,
    pub ramp: Ramp,
    pub thresholds: Vec<Threshold>,
}

impl LoadProfile {
    /// Default profile of each built-in scenario
    pub fn for_scenario(scenario: ScenarioKind) -> Self {
        let m = |m: u64| Duration::from_secs(m * 60);
        let s = Duration::from_secs;
        let lt = |metric: &str, aggregation, bound| {
            Threshold::new(metric, aggregation, Operator::Lt, bound)
        };
        let p = Aggregation::Percentile;

        let (test_type, stages, mut thresholds, success_floor) = match scenario {
            ScenarioKind::CouponIssue => (
                TestType::Peak,
                vec![(m(2), 100), (s(30), 600), (m(2), 600), (m(1), 100), (m(2), 0)],
                vec![
                    lt("http_req_duration", p(95.0), 500.0),
                    lt("http_req_duration", p(99.0), 1000.0),
                    lt("http_req_failed", Aggregation::Rate, 0.05),
                    lt("errors", Aggregation::Rate, 0.05),
                ],
                Some(("message_accept_rate", 0.95)),
            ),
            ScenarioKind::OrderCreate => (
                TestType::Load,
                vec![(m(2), 120), (m(5), 120), (m(2), 0)],
                vec![
                    lt("http_req_duration", p(95.0), 1000.0),
                    lt("http_req_duration", p(99.0), 2000.0),
                    lt("http_req_failed", Aggregation::Rate, 0.05),
                    lt("errors", Aggregation::Rate, 0.05),
                ],
                Some(("order_success_rate", 0.90)),
            ),
            ScenarioKind::Payment => (
                TestType::Load,
                vec![(m(2), 100), (m(5), 100), (m(2), 0)],
                vec![
                    lt("http_req_duration", p(95.0), 1500.0),
                    lt("http_req_duration", p(99.0), 3000.0),
                    lt("http_req_failed", Aggregation::Rate, 0.01),
                    lt("errors", Aggregation::Rate, 0.01),
                ],
                Some(("payment_success_rate", 0.95)),
            ),
            ScenarioKind::PopularProducts => (
                TestType::Peak,
                vec![(m(2), 60), (s(30), 300), (m(2), 300), (m(1), 60), (m(2), 0)],
                vec![
                    lt("http_req_duration", p(95.0), 500.0),
                    lt("http_req_duration", p(99.0), 1000.0),
                    lt("http_req_failed", Aggregation::Rate, 0.05),
                ],
                None,
            ),
        };

        if let Some((metric, floor)) = success_floor {
            thresholds.push(Threshold::new(metric, Aggregation::Rate, Operator::Gt, floor));
        }

        Self {
            scenario,
            test_type,
            ramp: Ramp::new(
                stages
                    .into_iter()
                    .map(|(duration, target)| Stage::new(duration, target))
                    .collect(),
            ),
            thresholds,
        }
    }
}
