//! Outbound transport: request descriptors and the HTTP send seam.
//!
//! The executor only talks to the [`Transport`] trait, so tests can script
//! responses and embedders can plug in their own client.

pub mod http;
pub mod request;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use http::HttpTransport;
pub use request::{RequestBuilder, RequestDescriptor, CORRELATION_HEADER};

/// Performs one HTTP send.
///
/// Implementations must be safe for concurrent use: every in-flight job shares the
/// same transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `Err` only when no response exists (build, network, cancellation, decoding).
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError>;
}

/// Transport-level failure: no usable response was produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be constructed.
    #[error("invalid request: {0}")]
    Build(String),
    /// DNS, connection, TLS or timeout failure.
    #[error("request failed: {0}")]
    Request(String),
    /// The descriptor's cancellation token fired while the send was in flight.
    #[error("request cancelled")]
    Cancelled,
    /// A response arrived but its body could not be decoded.
    #[error("failed to decode response body (status {status}): {message}")]
    Decode { status: u16, message: String },
}

/// Decoded response body: a success payload or an error payload, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Data(JsonValue),
    Error(JsonValue),
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn data(status: u16, data: JsonValue) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Data(data),
        }
    }

    pub fn error(status: u16, error: JsonValue) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Error(error),
        }
    }

    pub fn is_success_status(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}
