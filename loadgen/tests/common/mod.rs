//! Common Test Utilities for Integration Tests
//!
//! Serves a fake commerce API on an ephemeral port so the engine can be
//! driven over real HTTP.

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use commerce_loadgen::config::Config;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Behaviour knobs of the fake backend
#[derive(Debug, Clone)]
pub struct FakeApiOptions {
    /// Orders accepted before every further order is rejected with 409
    pub order_stock: u64,
    /// Coupons issued before requests are rejected with 409
    pub coupon_stock: u64,
    /// `/actuator/health` answers 503 when false
    pub healthy: bool,
    /// Every order request answers with this status instead
    pub order_status_override: Option<u16>,
}

impl Default for FakeApiOptions {
    fn default() -> Self {
        Self {
            order_stock: u64::MAX,
            coupon_stock: u64::MAX,
            healthy: true,
            order_status_override: None,
        }
    }
}

/// Shared state of the fake backend
#[derive(Default)]
pub struct FakeState {
    pub options: Mutex<FakeApiOptions>,
    next_order_id: AtomicI64,
    orders: Mutex<HashMap<i64, u64>>,
    issued: Mutex<HashSet<u64>>,
    pub health_requests: AtomicU64,
    pub api_requests: AtomicU64,
    pub orders_created: AtomicU64,
    pub payments: AtomicU64,
    /// Payments whose user did not place the referenced order
    pub mismatched_payments: AtomicU64,
    pub coupons_issued: AtomicU64,
    pub popular_requests: AtomicU64,
    pub saw_bad_body: AtomicBool,
}

impl FakeState {
    fn options(&self) -> FakeApiOptions {
        self.options.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCouponRequest {
    coupon_id: u64,
    user_id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    user_id: u64,
    delivery_username: String,
    delivery_address: String,
    coupon_id: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    order_id: i64,
    user_id: u64,
}

#[derive(Deserialize)]
struct PopularQuery {
    #[serde(rename = "type")]
    kind: String,
    days: u32,
    limit: usize,
}

async fn health(State(state): State<Arc<FakeState>>) -> Response {
    state.health_requests.fetch_add(1, Ordering::SeqCst);
    if state.options().healthy {
        Json(json!({"status": "UP"})).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "DOWN"}))).into_response()
    }
}

async fn issue_coupon(
    State(state): State<Arc<FakeState>>,
    Json(request): Json<IssueCouponRequest>,
) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    if request.coupon_id == 0 {
        state.saw_bad_body.store(true, Ordering::SeqCst);
    }

    let fresh = state
        .issued
        .lock()
        .map(|mut issued| issued.insert(request.user_id))
        .unwrap_or(false);
    if !fresh {
        return (
            StatusCode::CONFLICT,
            Json(json!({"success": false, "message": "already issued"})),
        )
            .into_response();
    }

    let issued = state.coupons_issued.fetch_add(1, Ordering::SeqCst);
    if issued >= state.options().coupon_stock {
        return (
            StatusCode::CONFLICT,
            Json(json!({"success": false, "message": "sold out"})),
        )
            .into_response();
    }
    Json(json!({"success": true, "message": "accepted"})).into_response()
}

async fn create_order(
    State(state): State<Arc<FakeState>>,
    Json(request): Json<CreateOrderRequest>,
) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    if request.delivery_username != format!("테스트유저{}", request.user_id)
        || request.delivery_address.is_empty()
        || request.coupon_id.is_some()
    {
        state.saw_bad_body.store(true, Ordering::SeqCst);
    }

    let options = state.options();
    if let Some(status) = options.order_status_override {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({"message": "overridden"}))).into_response();
    }

    let created = state.orders_created.fetch_add(1, Ordering::SeqCst);
    if created >= options.order_stock {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": "stock shortage"})),
        )
            .into_response();
    }

    let order_id = state.next_order_id.fetch_add(1, Ordering::SeqCst) + 1;
    if let Ok(mut orders) = state.orders.lock() {
        orders.insert(order_id, request.user_id);
    }
    Json(json!({"orderId": order_id, "status": "CREATED"})).into_response()
}

async fn pay_order(
    State(state): State<Arc<FakeState>>,
    Json(request): Json<PaymentRequest>,
) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    state.payments.fetch_add(1, Ordering::SeqCst);

    let owner = state
        .orders
        .lock()
        .ok()
        .and_then(|orders| orders.get(&request.order_id).copied());
    match owner {
        Some(user_id) if user_id == request.user_id => {
            Json(json!({"orderId": request.order_id, "status": "PAID"})).into_response()
        }
        _ => {
            state.mismatched_payments.fetch_add(1, Ordering::SeqCst);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": "unknown order"})),
            )
                .into_response()
        }
    }
}

async fn popular_products(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<PopularQuery>,
) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    state.popular_requests.fetch_add(1, Ordering::SeqCst);
    if query.kind != "SALES" || query.days != 3 {
        state.saw_bad_body.store(true, Ordering::SeqCst);
    }
    let products: Vec<_> = (1..=query.limit)
        .map(|id| json!({"productId": id, "name": format!("상품{id}"), "salesCount": 100 - id}))
        .collect();
    Json(products).into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(500)).await;
    "late"
}

/// A running fake backend
pub struct FakeApi {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

/// Current value of one of the fake backend's counters
pub fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::SeqCst)
}

/// Create the fake commerce router
pub fn create_test_app(state: Arc<FakeState>) -> Router {
    Router::new()
        .route("/actuator/health", get(health))
        .route("/api/coupons/issue/request", post(issue_coupon))
        .route("/api/orders", post(create_order))
        .route("/api/orders/payment", post(pay_order))
        .route("/api/products/popular", get(popular_products))
        .route("/slow", get(slow))
        .with_state(state)
}

/// Serve the fake API on an ephemeral local port
pub async fn spawn_fake_api(options: FakeApiOptions) -> FakeApi {
    let state = Arc::new(FakeState {
        options: Mutex::new(options),
        ..FakeState::default()
    });
    let app = create_test_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Fake API crashed");
    });

    FakeApi {
        base_url: format!("http://{addr}"),
        state,
    }
}

/// Short real-time run: two VUs for two seconds with fast pacing
pub fn short_run_config(base_url: &str) -> Config {
    Config {
        base_url: base_url.to_string(),
        stages: Some("0s:2,2s:2".to_string()),
        think_time: Duration::from_millis(100),
        step_pause: Duration::from_millis(20),
        poll_interval: Duration::from_millis(20),
        graceful_stop: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
        total_users: 50,
        seed: Some(42),
        ..Config::default()
    }
}
