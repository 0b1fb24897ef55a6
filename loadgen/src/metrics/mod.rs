//! Metrics shared by all virtual users
//!
//! This module provides:
//! - `MetricsRegistry` for concurrent rate, counter and trend accumulation
//! - `Snapshot` for read-only views consumed by the threshold judge and the summary
//! - the names of the built-in metrics every scenario records

mod registry;
mod types;

pub use registry::MetricsRegistry;
pub use types::{MetricKind, MetricValue, Snapshot, TrendSnapshot};

/// Built-in metric names
pub mod names {
    /// Counter: requests that received or failed to receive a response
    pub const HTTP_REQS: &str = "http_reqs";
    /// Trend: latency of every request that received a response
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    /// Rate: requests that ended in a server or transport error
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    /// Rate: steps that ended in a true failure (server, transport or parse error)
    pub const ERRORS: &str = "errors";
    /// Rate: every check outcome
    pub const CHECKS: &str = "checks";
    /// Counter: completed or aborted iterations
    pub const ITERATIONS: &str = "iterations";
    /// Counter: steps rejected for an expected business reason
    pub const BUSINESS_REJECTS: &str = "business_rejects";
    pub const SERVER_ERRORS: &str = "server_errors";
    pub const TRANSPORT_ERRORS: &str = "transport_errors";
    pub const PARSE_ERRORS: &str = "parse_errors";
}
