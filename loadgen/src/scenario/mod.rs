//! Business scenarios and their execution
//!
//! This module provides:
//! - `ScenarioPlan` describing the ordered steps of a scenario
//! - `ScenarioExecutor` running one iteration of a plan for one VU
//! - `InputDomain` sampling per-iteration user ids and addresses

mod executor;
mod input;
mod plan;
mod types;

pub use executor::ScenarioExecutor;
pub use input::{DEFAULT_ADDRESSES, InputDomain};
pub use plan::{
    DEFAULT_STEP_PAUSE, DEFAULT_THINK_TIME, Endpoint, Extract, PlanError, ScenarioKind,
    ScenarioPlan, StepPlan,
};
pub use types::{
    Correlation, IterationEnd, IterationInput, IterationReport, StepOutcome, StepRecord, VuContext,
};
