//! Commerce Load Engine Library
//!
//! Staged-concurrency load generation against the commerce HTTP API, with
//! per-response checks, run metrics and pass/fail thresholds. This module
//! exports the engine components for the binary and for integration tests.

pub mod check;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod report;
pub mod scenario;
pub mod scheduler;
pub mod threshold;
pub mod transport;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::{Config, LoadProfile};
pub use engine::{Engine, RunError};
pub use metrics::{MetricsRegistry, Snapshot};
pub use report::RunSummary;
pub use scenario::{ScenarioExecutor, ScenarioKind, ScenarioPlan};
pub use scheduler::{Ramp, StageScheduler};
pub use threshold::{Threshold, Verdict, judge};
