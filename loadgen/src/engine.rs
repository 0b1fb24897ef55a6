//! Run lifecycle: setup, load, judgment, teardown

use crate::config::{Config, ConfigError};
use crate::metrics::MetricsRegistry;
use crate::report::RunSummary;
use crate::scenario::ScenarioExecutor;
use crate::scheduler::StageScheduler;
use crate::threshold::judge;
use crate::transport::{HttpRequest, Transport};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors that stop a run before any VU starts
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Health check failed: {reason}")]
    HealthCheckFailed { status: Option<u16>, reason: String },

    #[error("Invalid load profile: {0}")]
    InvalidProfile(#[from] ConfigError),
}

/// `GET /actuator/health` must answer 200 before load starts
pub async fn health_check(transport: &dyn Transport, base_url: &str) -> Result<(), RunError> {
    let url = format!("{}/actuator/health", base_url.trim_end_matches('/'));
    match transport.send(HttpRequest::get(url)).await {
        Ok(response) if response.status == 200 => {
            info!(base_url, "Health check passed");
            Ok(())
        }
        Ok(response) => Err(RunError::HealthCheckFailed {
            status: Some(response.status),
            reason: format!("status {}", response.status),
        }),
        Err(e) => Err(RunError::HealthCheckFailed {
            status: None,
            reason: e.to_string(),
        }),
    }
}

/// Runs one configured scenario end to end
pub struct Engine {
    config: Config,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the run early; the summary is still produced
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let config = &self.config;
        let profile = config.load_profile()?;
        let plan = config.plan()?;

        health_check(self.transport.as_ref(), &config.base_url).await?;

        let registry = Arc::new(MetricsRegistry::new());
        let executor = Arc::new(ScenarioExecutor::new(
            plan,
            config.base_url.clone(),
            config.inputs(),
            self.transport.clone(),
            registry.clone(),
        ));

        let mut scheduler = StageScheduler::new(executor, profile.ramp.clone())
            .with_poll_interval(config.poll_interval)
            .with_graceful_stop(config.graceful_stop)
            .with_seed(config.seed)
            .with_cancel_token(self.cancel.clone());
        if let Some(interval) = config.threshold_check_interval {
            scheduler = scheduler.with_rolling_thresholds(
                profile.thresholds.clone(),
                interval,
                config.abort_on_fail,
            );
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            scenario = %config.scenario,
            base_url = %config.base_url,
            thresholds = profile.thresholds.len(),
            "Run started"
        );

        let schedule = scheduler.run().await;

        let snapshot = registry.snapshot();
        let verdict = judge(&snapshot, &profile.thresholds);
        for failure in verdict.failures() {
            warn!(
                metric = %failure.metric,
                threshold = %failure.expression,
                observed = ?failure.observed,
                "Threshold failed"
            );
        }
        info!(
            %run_id,
            passed = verdict.passed,
            iterations = schedule.iterations,
            "Run finished"
        );

        Ok(RunSummary::new(
            run_id,
            config.scenario,
            profile.test_type,
            config.base_url.clone(),
            started_at,
            &schedule,
            snapshot,
            verdict,
        ))
    }
}
