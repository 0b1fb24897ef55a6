//! Step outcomes, iteration reports and per-VU context

use crate::transport::{HttpRequest, HttpResponse};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::time::Duration;

/// Classification of one executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// 2xx, and the expected correlation field (if any) was present
    Success,
    /// 400/409: sold out, already issued, empty cart, stock or balance shortage
    BusinessReject,
    /// 5xx, or any status the backend is not expected to return
    ServerError,
    /// No response was received
    TransportError,
    /// The body was not decodable or lacked the expected field
    ParseError,
}

impl StepOutcome {
    /// Classify a received HTTP status
    pub fn classify(status: u16) -> Self {
        match status {
            200..=299 => StepOutcome::Success,
            400 | 409 => StepOutcome::BusinessReject,
            _ => StepOutcome::ServerError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }

    /// Outcomes that count against `http_req_failed`
    pub fn is_request_failure(&self) -> bool {
        matches!(self, StepOutcome::ServerError | StepOutcome::TransportError)
    }

    /// Outcomes that count against the `errors` rate; business rejects do not
    pub fn is_true_failure(&self) -> bool {
        matches!(
            self,
            StepOutcome::ServerError | StepOutcome::TransportError | StepOutcome::ParseError
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepOutcome::Success => "success",
            StepOutcome::BusinessReject => "business_reject",
            StepOutcome::ServerError => "server_error",
            StepOutcome::TransportError => "transport_error",
            StepOutcome::ParseError => "parse_error",
        }
    }
}

/// Parameters sampled once per iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationInput {
    pub user_id: u64,
    pub delivery_username: String,
    pub delivery_address: String,
}

/// Values extracted from earlier steps for later ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Correlation {
    pub order_id: Option<i64>,
}

/// One executed (or attempted) step of an iteration
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: &'static str,
    /// `None` when the request could not be built
    pub request: Option<HttpRequest>,
    /// `None` on transport errors
    pub response: Option<HttpResponse>,
    pub outcome: StepOutcome,
    /// Transport or decode error message, if any
    pub error: Option<String>,
}

impl StepRecord {
    pub fn latency(&self) -> Option<Duration> {
        self.response.as_ref().map(|r| r.latency)
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

/// Terminal state of an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationEnd {
    /// Every step succeeded
    Complete,
    /// A step failed; the remaining steps were skipped
    Aborted {
        step: &'static str,
        outcome: StepOutcome,
    },
}

/// Everything that happened during one iteration
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub input: IterationInput,
    pub steps: Vec<StepRecord>,
    pub end: IterationEnd,
}

impl IterationReport {
    pub fn is_complete(&self) -> bool {
        self.end == IterationEnd::Complete
    }

    pub fn last_step(&self) -> Option<&StepRecord> {
        self.steps.last()
    }
}

/// State owned by one virtual user across its iterations
#[derive(Debug)]
pub struct VuContext {
    pub id: u64,
    pub iterations: u64,
    /// Step currently in flight, if any
    pub current_step: Option<&'static str>,
    pub rng: ChaCha8Rng,
}

impl VuContext {
    /// With a run seed every VU gets its own reproducible stream
    pub fn new(id: u64, seed: Option<u64>) -> Self {
        let seed = seed.map_or_else(rand::random::<u64>, |s| s.wrapping_add(id));
        Self {
            id,
            iterations: 0,
            current_step: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}
