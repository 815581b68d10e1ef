//! Request descriptor and its builder.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Header carrying a per-request correlation id to the remote service.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// An immutable, fully built outbound request.
///
/// A descriptor can carry a build-time error (for example a body that failed to
/// serialize). Such a descriptor is still dispatchable, but every attempt fails
/// without touching the network.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    context: CancellationToken,
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
    build_error: Option<String>,
}

impl RequestDescriptor {
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    /// Cancellation token honoured by the transport while a send is in flight.
    pub fn context(&self) -> &CancellationToken {
        &self.context
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Headers with lowercase names.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn build_error(&self) -> Option<&str> {
        self.build_error.as_deref()
    }
}

/// Builder for [`RequestDescriptor`].
#[derive(Debug)]
pub struct RequestBuilder {
    context: CancellationToken,
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
    build_error: Option<String>,
}

impl RequestBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            context: CancellationToken::new(),
            url: url.into(),
            method: Method::GET,
            headers: BTreeMap::new(),
            body: None,
            build_error: None,
        }
    }

    pub fn context(mut self, token: CancellationToken) -> Self {
        self.context = token;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set a header. Names are case-insensitive; the last value wins.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn json_headers(self) -> Self {
        self.header("content-type", "application/json")
            .header("accept", "application/json")
    }

    /// Tag the request with a fresh `x-correlation-id`.
    pub fn correlation_id(self) -> Self {
        self.header(CORRELATION_HEADER, Uuid::new_v4().to_string())
    }

    /// Serialize `entity` as the JSON body.
    ///
    /// A serialization failure does not panic: it is kept as the descriptor's
    /// build error.
    pub fn json_body<T: Serialize + ?Sized>(mut self, entity: &T) -> Self {
        match serde_json::to_vec(entity) {
            Ok(bytes) => self.body = Some(bytes),
            Err(e) => self.build_error = Some(format!("failed to serialize request body: {e}")),
        }
        self
    }

    /// Use pre-serialized bytes as the body.
    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(bytes.into());
        self
    }

    pub fn build(self) -> RequestDescriptor {
        RequestDescriptor {
            context: self.context,
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            build_error: self.build_error,
        }
    }
}
