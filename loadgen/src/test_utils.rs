//! Test Utilities Module
//!
//! Provides a scripted transport and fixtures for testing the load engine.
//! This module is only compiled when running tests.

#![cfg(test)]

use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Mock Transport
// ============================================================================

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Transport that replays scripted responses and records every request
///
/// Scripted responses are consumed first; once the script is empty the
/// responder answers (by default `200 {}`).
pub struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    responder: Arc<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Duration,
    in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_responder(|_| Ok(HttpResponse::new(200, "{}", Duration::from_millis(1))))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Arc::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Every request waits `delay` (on the tokio clock) before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests sent but not yet answered
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => (self.responder)(&request),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// `200` response with a JSON body
pub fn json_response(body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(200, body.to_string(), Duration::from_millis(10))
}

// ============================================================================
// Tests for Test Utilities
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_responder() {
        let transport = MockTransport::new();
        transport.push_response(HttpResponse::new(409, "sold out", Duration::ZERO));
        transport.push_error(TransportError::Connect("refused".to_string()));

        let first = transport.send(HttpRequest::get("http://a/1")).await.unwrap();
        assert_eq!(first.status, 409);
        assert!(transport.send(HttpRequest::get("http://a/2")).await.is_err());
        let third = transport.send(HttpRequest::get("http://a/3")).await.unwrap();
        assert_eq!(third.status, 200);

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["http://a/1", "http://a/2", "http://a/3"]);
    }

    #[test]
    fn test_json_response() {
        let response = json_response(serde_json::json!({"orderId": 3}));
        assert_eq!(response.status, 200);
        assert_eq!(response.json::<serde_json::Value>().unwrap()["orderId"], 3);
    }
}
