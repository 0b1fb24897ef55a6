//! HTTP transport boundary
//!
//! The scenario executor only talks to the backend through the `Transport`
//! trait, so tests substitute scripted responses and the binary plugs in
//! `ReqwestTransport`.

mod client;
mod types;

pub use client::{ReqwestTransport, Transport};
pub use types::{DecodeError, HttpRequest, HttpResponse, Method, TransportError};
