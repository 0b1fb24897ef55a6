//! Stage scheduler
//!
//! Converts a ramp of stages into a live VU population: every poll it
//! compares the ramp's target with the running VUs and spawns or retires
//! the difference.

mod runner;
mod stage;

pub use runner::{
    DEFAULT_GRACEFUL_STOP, DEFAULT_POLL_INTERVAL, ScheduleReport, StageScheduler, StopReason,
};
pub use stage::{Ramp, Stage, StageParseError, parse_duration, parse_stages};
