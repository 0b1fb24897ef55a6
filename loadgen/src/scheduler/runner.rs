//! Drives the VU population along a ramp

use super::stage::Ramp;
use crate::scenario::{ScenarioExecutor, VuContext};
use crate::threshold::{Threshold, judge};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Why the scheduling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The ramp ran to its end
    Completed,
    /// The run token was cancelled from outside
    Cancelled,
    /// A rolling judgment failed with abort-on-fail enabled
    ThresholdsFailed,
}

/// What the scheduler observed over a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub elapsed: Duration,
    pub peak_vus: u64,
    pub vus_spawned: u64,
    pub iterations: u64,
    /// VUs still busy after the graceful stop period
    pub vus_aborted: u64,
    pub stop_reason: StopReason,
}

struct LiveVu {
    id: u64,
    stop: CancellationToken,
}

/// Spawns and retires VUs so the live count follows the ramp
pub struct StageScheduler {
    executor: Arc<ScenarioExecutor>,
    ramp: Ramp,
    poll_interval: Duration,
    graceful_stop: Duration,
    seed: Option<u64>,
    thresholds: Vec<Threshold>,
    threshold_check_interval: Option<Duration>,
    abort_on_fail: bool,
    cancel: CancellationToken,
}

impl StageScheduler {
    pub fn new(executor: Arc<ScenarioExecutor>, ramp: Ramp) -> Self {
        Self {
            executor,
            ramp,
            poll_interval: DEFAULT_POLL_INTERVAL,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            seed: None,
            thresholds: Vec::new(),
            threshold_check_interval: None,
            abort_on_fail: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        // A zero period would make `tokio::time::interval` panic
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Judge `thresholds` every `interval` while the run is in progress
    pub fn with_rolling_thresholds(
        mut self,
        thresholds: Vec<Threshold>,
        interval: Duration,
        abort_on_fail: bool,
    ) -> Self {
        self.thresholds = thresholds;
        self.threshold_check_interval = Some(interval.max(Duration::from_millis(1)));
        self.abort_on_fail = abort_on_fail;
        self
    }

    /// Run under an externally owned token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling this token ends the run; VUs stop at their next iteration boundary
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(self) -> ScheduleReport {
        let started = Instant::now();
        let total = self.ramp.total_duration();
        let iterations = Arc::new(AtomicU64::new(0));
        let vus_token = self.cancel.child_token();

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut live: Vec<LiveVu> = Vec::new();
        let mut next_id = 1;
        let mut peak_vus = 0;

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut judge_tick = self.threshold_check_interval.map(|period| {
            let mut tick = tokio::time::interval_at(started + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick
        });

        info!(
            scenario = %self.executor.plan().name,
            duration_secs = total.as_secs_f64(),
            peak_target = self.ramp.peak(),
            "Starting stages"
        );

        let stop_reason = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Run cancelled");
                    break StopReason::Cancelled;
                }
                _ = poll.tick() => {
                    let elapsed = started.elapsed();
                    if elapsed >= total {
                        break StopReason::Completed;
                    }

                    let target = self.ramp.target_at(elapsed);
                    while (live.len() as u64) < target {
                        let id = next_id;
                        next_id += 1;
                        let stop = vus_token.child_token();
                        let vu = VuContext::new(id, self.seed);
                        tasks.spawn(run_vu(
                            self.executor.clone(),
                            vu,
                            stop.clone(),
                            iterations.clone(),
                        ));
                        live.push(LiveVu { id, stop });
                    }
                    // Newest first
                    while (live.len() as u64) > target {
                        if let Some(vu) = live.pop() {
                            debug!(vu = vu.id, "Retiring VU");
                            vu.stop.cancel();
                        }
                    }
                    peak_vus = peak_vus.max(live.len() as u64);
                }
                _ = next_tick(&mut judge_tick) => {
                    let verdict = judge(&self.executor.registry().snapshot(), &self.thresholds);
                    for failure in verdict.failures() {
                        warn!(
                            metric = %failure.metric,
                            threshold = %failure.expression,
                            observed = ?failure.observed,
                            "Threshold failing"
                        );
                    }
                    if !verdict.passed && self.abort_on_fail {
                        warn!("Thresholds failed, aborting run");
                        break StopReason::ThresholdsFailed;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined && e.is_panic() {
                        error!(error = %e, "VU task panicked");
                    }
                }
            }
        };

        info!(
            reason = ?stop_reason,
            live_vus = live.len(),
            "Stopping VUs"
        );
        vus_token.cancel();
        let vus_aborted = self.drain(tasks).await;

        let report = ScheduleReport {
            elapsed: started.elapsed(),
            peak_vus,
            vus_spawned: next_id - 1,
            iterations: iterations.load(Ordering::SeqCst),
            vus_aborted,
            stop_reason,
        };
        info!(
            peak_vus = report.peak_vus,
            vus_spawned = report.vus_spawned,
            iterations = report.iterations,
            "Stages finished"
        );
        report
    }

    /// Wait up to the graceful stop period, then abort what is left
    async fn drain(&self, mut tasks: JoinSet<()>) -> u64 {
        let waited = tokio::time::timeout(self.graceful_stop, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if waited.is_ok() {
            return 0;
        }

        let remaining = tasks.len() as u64;
        warn!(
            vus = remaining,
            graceful_stop_secs = self.graceful_stop.as_secs_f64(),
            "Aborting VUs still busy after graceful stop"
        );
        tasks.shutdown().await;
        remaining
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Iterate until `stop` is cancelled; the check happens only between iterations
async fn run_vu(
    executor: Arc<ScenarioExecutor>,
    mut vu: VuContext,
    stop: CancellationToken,
    iterations: Arc<AtomicU64>,
) {
    debug!(vu = vu.id, "VU started");
    let think_time = executor.plan().think_time;

    while !stop.is_cancelled() {
        executor.run_iteration(&mut vu).await;
        iterations.fetch_add(1, Ordering::SeqCst);

        if think_time.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(think_time) => {}
        }
    }

    debug!(vu = vu.id, iterations = vu.iterations, "VU stopped");
}
