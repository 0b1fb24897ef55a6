//! Scenario plans: ordered steps, their endpoints, checks and metric names
//!
//! | Kind               | Steps                               | Success rate           |
//! |--------------------|-------------------------------------|------------------------|
//! | `coupon-issue`     | issue coupon                        | `message_accept_rate`  |
//! | `order-create`     | create order                        | `order_success_rate`   |
//! | `payment`          | create order → pay order (orderId)  | `payment_success_rate` |
//! | `popular-products` | list popular products               | `popular_success_rate` |

use super::types::{Correlation, IterationInput};
use crate::check::{Check, CheckSet};
use crate::transport::{DecodeError, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default pause between the iterations of one VU
pub const DEFAULT_THINK_TIME: Duration = Duration::from_secs(1);
/// Default pause between dependent steps (the user reviewing the order)
pub const DEFAULT_STEP_PAUSE: Duration = Duration::from_millis(500);

/// Errors raised while building a scenario plan
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Unknown scenario `{0}` (expected coupon-issue, order-create, payment or popular-products)")]
    UnknownScenario(String),

    #[error("Scenario has no steps")]
    Empty,

    #[error("Step `{step}` needs `{field}` but no earlier step extracts it")]
    UnresolvedCorrelation { step: &'static str, field: &'static str },
}

/// Built-in business scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    CouponIssue,
    OrderCreate,
    Payment,
    PopularProducts,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::CouponIssue,
        ScenarioKind::OrderCreate,
        ScenarioKind::Payment,
        ScenarioKind::PopularProducts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::CouponIssue => "coupon-issue",
            ScenarioKind::OrderCreate => "order-create",
            ScenarioKind::Payment => "payment",
            ScenarioKind::PopularProducts => "popular-products",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        ScenarioKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| PlanError::UnknownScenario(s.to_string()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueCouponBody {
    coupon_id: u64,
    user_id: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody<'a> {
    user_id: u64,
    delivery_username: &'a str,
    delivery_address: &'a str,
    coupon_id: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody {
    order_id: i64,
    user_id: u64,
}

/// Backend endpoint called by a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /api/coupons/issue/request`
    IssueCoupon { coupon_id: u64 },
    /// `POST /api/orders`
    CreateOrder { coupon_id: Option<u64> },
    /// `POST /api/orders/payment`, needs the order id of an earlier step
    PayOrder,
    /// `GET /api/products/popular`
    PopularProducts { kind: String, days: u32, limit: u32 },
}

impl Endpoint {
    /// Correlation field this endpoint depends on
    pub fn requires(&self) -> Option<&'static str> {
        match self {
            Endpoint::PayOrder => Some("orderId"),
            _ => None,
        }
    }

    /// Build the request for this iteration
    pub fn request(
        &self,
        base_url: &str,
        input: &IterationInput,
        carried: &Correlation,
    ) -> Result<HttpRequest, DecodeError> {
        let base = base_url.trim_end_matches('/');
        let request = match self {
            Endpoint::IssueCoupon { coupon_id } => HttpRequest::post_json(
                format!("{base}/api/coupons/issue/request"),
                &IssueCouponBody {
                    coupon_id: *coupon_id,
                    user_id: input.user_id,
                },
            ),
            Endpoint::CreateOrder { coupon_id } => HttpRequest::post_json(
                format!("{base}/api/orders"),
                &CreateOrderBody {
                    user_id: input.user_id,
                    delivery_username: &input.delivery_username,
                    delivery_address: &input.delivery_address,
                    coupon_id: *coupon_id,
                },
            ),
            Endpoint::PayOrder => {
                let order_id = carried.order_id.ok_or(DecodeError::MissingField("orderId"))?;
                HttpRequest::post_json(
                    format!("{base}/api/orders/payment"),
                    &PaymentBody {
                        order_id,
                        user_id: input.user_id,
                    },
                )
            }
            Endpoint::PopularProducts { kind, days, limit } => HttpRequest::get(format!(
                "{base}/api/products/popular?type={kind}&days={days}&limit={limit}"
            )),
        };
        Ok(request)
    }
}

#[derive(Deserialize)]
struct OrderIdBody {
    #[serde(rename = "orderId")]
    order_id: Option<serde_json::Value>,
}

/// Positive integer `orderId` of a response body
fn decode_order_id(response: &HttpResponse) -> Result<i64, DecodeError> {
    let body: OrderIdBody = response.json()?;
    body.order_id
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .filter(|id| *id > 0)
        .ok_or(DecodeError::MissingField("orderId"))
}

/// Correlation value a step extracts from its successful response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    OrderId,
}

impl Extract {
    pub fn field(&self) -> &'static str {
        match self {
            Extract::OrderId => "orderId",
        }
    }

    pub fn apply(&self, response: &HttpResponse, carried: &mut Correlation) -> Result<(), DecodeError> {
        match self {
            Extract::OrderId => carried.order_id = Some(decode_order_id(response)?),
        }
        Ok(())
    }
}

/// One step of a scenario
#[derive(Debug, Clone)]
pub struct StepPlan {
    pub name: &'static str,
    pub endpoint: Endpoint,
    pub extract: Option<Extract>,
    /// Counter incremented when this step is rejected for a business reason
    pub reject_counter: Option<&'static str>,
    /// Checks run when this is the last step executed in an iteration
    pub checks: CheckSet,
}

impl StepPlan {
    pub fn new(name: &'static str, endpoint: Endpoint) -> Self {
        Self {
            name,
            endpoint,
            extract: None,
            reject_counter: None,
            checks: CheckSet::new(),
        }
    }

    pub fn extracting(mut self, extract: Extract) -> Self {
        self.extract = Some(extract);
        self
    }

    pub fn rejects_into(mut self, counter: &'static str) -> Self {
        self.reject_counter = Some(counter);
        self
    }

    pub fn with_checks(mut self, checks: CheckSet) -> Self {
        self.checks = checks;
        self
    }
}

/// Ordered steps plus the pacing and metric names of a scenario
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    pub name: String,
    pub steps: Vec<StepPlan>,
    /// Rate of iterations that completed every step
    pub success_rate: &'static str,
    pub step_pause: Duration,
    pub think_time: Duration,
}

impl ScenarioPlan {
    /// Validate that every correlation a step needs is extracted earlier
    pub fn new(
        name: impl Into<String>,
        steps: Vec<StepPlan>,
        success_rate: &'static str,
    ) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut extracted: Vec<&'static str> = Vec::new();
        for step in &steps {
            if let Some(field) = step.endpoint.requires()
                && !extracted.contains(&field)
            {
                return Err(PlanError::UnresolvedCorrelation {
                    step: step.name,
                    field,
                });
            }
            if let Some(extract) = step.extract {
                extracted.push(extract.field());
            }
        }

        Ok(Self {
            name: name.into(),
            steps,
            success_rate,
            step_pause: DEFAULT_STEP_PAUSE,
            think_time: DEFAULT_THINK_TIME,
        })
    }

    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn with_step_pause(mut self, step_pause: Duration) -> Self {
        self.step_pause = step_pause;
        self
    }

    /// Plan of one of the built-in scenarios
    pub fn builtin(kind: ScenarioKind, coupon_id: u64) -> Result<Self, PlanError> {
        let (steps, success_rate) = match kind {
            ScenarioKind::CouponIssue => (
                vec![
                    StepPlan::new("issue_coupon", Endpoint::IssueCoupon { coupon_id })
                        .rejects_into("coupon_rejects")
                        .with_checks(coupon_checks()),
                ],
                "message_accept_rate",
            ),
            ScenarioKind::OrderCreate => (
                vec![
                    StepPlan::new("create_order", Endpoint::CreateOrder { coupon_id: None })
                        .rejects_into("stock_shortage_errors")
                        .with_checks(order_checks()),
                ],
                "order_success_rate",
            ),
            ScenarioKind::Payment => (
                vec![
                    StepPlan::new("create_order", Endpoint::CreateOrder { coupon_id: None })
                        .extracting(Extract::OrderId)
                        .rejects_into("order_rejects"),
                    StepPlan::new("pay_order", Endpoint::PayOrder)
                        .rejects_into("point_shortage_errors")
                        .with_checks(payment_checks()),
                ],
                "payment_success_rate",
            ),
            ScenarioKind::PopularProducts => (
                vec![
                    StepPlan::new(
                        "popular_products",
                        Endpoint::PopularProducts {
                            kind: "SALES".to_string(),
                            days: 3,
                            limit: 5,
                        },
                    )
                    .with_checks(popular_checks()),
                ],
                "popular_success_rate",
            ),
        };

        Self::new(kind.name(), steps, success_rate)
    }
}

#[derive(Deserialize)]
struct CouponAck {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

fn coupon_checks() -> CheckSet {
    CheckSet::new()
        .with(Check::status_is(200))
        .with(Check::latency_below("response time < 500ms", Duration::from_millis(500)))
        .with(Check::new("message accepted", |r| {
            if r.status != 200 {
                return Ok(false);
            }
            let ack: CouponAck = r.json()?;
            Ok(ack.success == Some(true) || ack.message.as_deref() == Some("accepted"))
        }))
}

fn order_checks() -> CheckSet {
    CheckSet::new()
        .with(Check::status_is(200))
        .with(Check::latency_below("response time < 1000ms", Duration::from_millis(1000)))
        .with(Check::new("has order data", |r| {
            Ok(r.status == 200 && decode_order_id(r).is_ok())
        }))
}

fn payment_checks() -> CheckSet {
    CheckSet::new()
        .with(Check::new("payment status is 200", |r| Ok(r.status == 200)))
        .with(Check::latency_below(
            "payment response time < 1500ms",
            Duration::from_millis(1500),
        ))
        .with(Check::new("has payment data", |r| {
            if r.status != 200 {
                return Ok(false);
            }
            let body: serde_json::Value = r.json()?;
            Ok(body.get("orderId").is_some())
        }))
}

fn popular_checks() -> CheckSet {
    CheckSet::new()
        .with(Check::status_is(200))
        .with(Check::latency_below("response time < 1s", Duration::from_secs(1)))
        .with(Check::new("has popular products", |r| {
            let products: Vec<serde_json::Value> = r.json()?;
            Ok(!products.is_empty())
        }))
}
