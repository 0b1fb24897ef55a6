//! Pass/fail thresholds over run metrics

mod expr;
mod judge;

pub use expr::{Aggregation, Operator, Threshold, ThresholdParseError, parse_thresholds};
pub use judge::{ThresholdResult, Verdict, judge};
