//! Runs one iteration of a scenario plan for one VU

use super::input::InputDomain;
use super::plan::{ScenarioPlan, StepPlan};
use super::types::{
    Correlation, IterationEnd, IterationInput, IterationReport, StepOutcome, StepRecord, VuContext,
};
use crate::metrics::{MetricKind, MetricsRegistry, names};
use crate::transport::Transport;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fraction of successful steps logged at debug level
const SUCCESS_LOG_SAMPLE: f64 = 0.01;

/// Executes iterations of one scenario against the backend
pub struct ScenarioExecutor {
    plan: ScenarioPlan,
    base_url: String,
    inputs: InputDomain,
    transport: Arc<dyn Transport>,
    registry: Arc<MetricsRegistry>,
}

impl ScenarioExecutor {
    pub fn new(
        plan: ScenarioPlan,
        base_url: impl Into<String>,
        inputs: InputDomain,
        transport: Arc<dyn Transport>,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        // Register every metric up front so thresholds on metrics that never
        // received a sample observe zero instead of "missing"
        registry.register(names::HTTP_REQS, MetricKind::Counter);
        registry.register(names::HTTP_REQ_DURATION, MetricKind::Trend);
        registry.register(names::HTTP_REQ_FAILED, MetricKind::Rate);
        registry.register(names::ERRORS, MetricKind::Rate);
        registry.register(names::ITERATIONS, MetricKind::Counter);
        registry.register(names::BUSINESS_REJECTS, MetricKind::Counter);
        registry.register(names::SERVER_ERRORS, MetricKind::Counter);
        registry.register(names::TRANSPORT_ERRORS, MetricKind::Counter);
        registry.register(names::PARSE_ERRORS, MetricKind::Counter);
        registry.register(plan.success_rate, MetricKind::Rate);
        for step in &plan.steps {
            if let Some(counter) = step.reject_counter {
                registry.register(counter, MetricKind::Counter);
            }
        }

        Self {
            plan,
            base_url: base_url.into(),
            inputs,
            transport,
            registry,
        }
    }

    pub fn plan(&self) -> &ScenarioPlan {
        &self.plan
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Run every step of the plan in order, stopping at the first non-success
    pub async fn run_iteration(&self, vu: &mut VuContext) -> IterationReport {
        let input = self.inputs.sample(&mut vu.rng);
        let mut carried = Correlation::default();
        let mut steps = Vec::with_capacity(self.plan.steps.len());
        let mut end = IterationEnd::Complete;

        for (index, step) in self.plan.steps.iter().enumerate() {
            if index > 0 && !self.plan.step_pause.is_zero() {
                tokio::time::sleep(self.plan.step_pause).await;
            }

            vu.current_step = Some(step.name);
            let record = self.run_step(step, &input, &mut carried).await;
            vu.current_step = None;

            self.record_step(step, &record);
            self.log_step(vu, &input, &record);

            let outcome = record.outcome;
            steps.push(record);
            if !outcome.is_success() {
                end = IterationEnd::Aborted {
                    step: step.name,
                    outcome,
                };
                break;
            }
        }

        vu.iterations += 1;
        let report = IterationReport { input, steps, end };
        self.finish_iteration(&report);
        report
    }

    async fn run_step(
        &self,
        step: &StepPlan,
        input: &IterationInput,
        carried: &mut Correlation,
    ) -> StepRecord {
        let request = match step.endpoint.request(&self.base_url, input, carried) {
            Ok(request) => request,
            Err(e) => {
                return StepRecord {
                    step: step.name,
                    request: None,
                    response: None,
                    outcome: StepOutcome::ParseError,
                    error: Some(e.to_string()),
                };
            }
        };

        let response = match self.transport.send(request.clone()).await {
            Ok(response) => response,
            Err(e) => {
                return StepRecord {
                    step: step.name,
                    request: Some(request),
                    response: None,
                    outcome: StepOutcome::TransportError,
                    error: Some(e.to_string()),
                };
            }
        };

        let mut outcome = StepOutcome::classify(response.status);
        let mut error = None;
        if outcome.is_success()
            && let Some(extract) = step.extract
            && let Err(e) = extract.apply(&response, carried)
        {
            outcome = StepOutcome::ParseError;
            error = Some(e.to_string());
        }

        StepRecord {
            step: step.name,
            request: Some(request),
            response: Some(response),
            outcome,
            error,
        }
    }

    fn record_step(&self, step: &StepPlan, record: &StepRecord) {
        let registry = &self.registry;

        // A request that was never built was never sent
        if record.request.is_some() {
            registry.increment_counter(names::HTTP_REQS, 1);
            registry.record_rate(names::HTTP_REQ_FAILED, record.outcome.is_request_failure());
        }
        if let Some(latency) = record.latency() {
            registry.record_trend(names::HTTP_REQ_DURATION, latency);
        }
        registry.record_rate(names::ERRORS, record.outcome.is_true_failure());

        match record.outcome {
            StepOutcome::Success => {}
            StepOutcome::BusinessReject => {
                registry.increment_counter(names::BUSINESS_REJECTS, 1);
                if let Some(counter) = step.reject_counter {
                    registry.increment_counter(counter, 1);
                }
            }
            StepOutcome::ServerError => registry.increment_counter(names::SERVER_ERRORS, 1),
            StepOutcome::TransportError => registry.increment_counter(names::TRANSPORT_ERRORS, 1),
            StepOutcome::ParseError => registry.increment_counter(names::PARSE_ERRORS, 1),
        }
    }

    fn log_step(&self, vu: &mut VuContext, input: &IterationInput, record: &StepRecord) {
        let status = record.status();
        let latency_ms = record.latency().map(|l| l.as_millis() as u64);
        match record.outcome {
            StepOutcome::Success => {
                if vu.rng.random_bool(SUCCESS_LOG_SAMPLE) {
                    debug!(
                        vu = vu.id,
                        step = record.step,
                        user_id = input.user_id,
                        ?latency_ms,
                        "Step succeeded"
                    );
                }
            }
            StepOutcome::BusinessReject => {
                info!(
                    vu = vu.id,
                    step = record.step,
                    user_id = input.user_id,
                    ?status,
                    body = %record.response.as_ref().map(|r| r.text()).unwrap_or_default(),
                    "Business reject"
                );
            }
            StepOutcome::ServerError => {
                error!(
                    vu = vu.id,
                    step = record.step,
                    user_id = input.user_id,
                    ?status,
                    body = %record.response.as_ref().map(|r| r.text()).unwrap_or_default(),
                    "Server error"
                );
            }
            StepOutcome::TransportError => {
                warn!(
                    vu = vu.id,
                    step = record.step,
                    error = record.error.as_deref().unwrap_or_default(),
                    "Transport error"
                );
            }
            StepOutcome::ParseError => {
                warn!(
                    vu = vu.id,
                    step = record.step,
                    ?status,
                    error = record.error.as_deref().unwrap_or_default(),
                    "Failed to decode response"
                );
            }
        }
    }

    fn finish_iteration(&self, report: &IterationReport) {
        self.registry.record_rate(self.plan.success_rate, report.is_complete());
        self.registry.increment_counter(names::ITERATIONS, 1);

        if let Some(step) = report.last_step()
            && let Some(plan) = self.plan.steps.iter().find(|s| s.name == step.step)
        {
            match &step.response {
                Some(response) => plan.checks.evaluate(response, &self.registry),
                None => plan.checks.fail_all(&self.registry),
            };
        }
    }
}
