//! Request, response and error types exchanged with the transport

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that prevent a response from being received
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

/// A response body could not be decoded into the expected shape
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("Malformed JSON body: {0}")]
    Malformed(String),

    #[error("Missing or invalid field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// One outgoing HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL including the query string
    pub url: String,
    /// JSON body for POST requests
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post_json<T: Serialize>(url: impl Into<String>, body: &T) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            // Serializing derive-based request structs into a Value cannot fail
            body: Some(serde_json::to_value(body).unwrap_or(serde_json::Value::Null)),
        }
    }

    /// Value of a top-level field of the JSON body
    pub fn body_field(&self, field: &str) -> Option<&serde_json::Value> {
        self.body.as_ref().and_then(|b| b.get(field))
    }
}

/// A received HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Time from sending the request to receiving the full body
    pub latency: Duration,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, latency: Duration) -> Self {
        Self {
            status,
            body: body.into(),
            latency,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_slice(&self.body).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
