//! `reqwest`-backed transport.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{RequestDescriptor, ResponseBody, Transport, TransportError, TransportResponse};

/// HTTP transport over a shared `reqwest::Client`.
///
/// The client pools connections and is cheap to share across jobs.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Build a transport whose requests time out after `timeout` (whole request).
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn dispatch(
        &self,
        request: &RequestDescriptor,
    ) -> Result<TransportResponse, TransportError> {
        let mut call = self
            .client
            .request(request.method().clone(), request.url());

        for (name, value) in request.headers() {
            call = call.header(name, value);
        }
        if let Some(body) = request.body() {
            call = call.body(body.to_vec());
        }

        let response = call
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| TransportError::Decode {
            status,
            message: e.to_string(),
        })?;
        let payload = decode_json(status, &bytes)?;

        let body = if (200..=299).contains(&status) {
            ResponseBody::Data(payload)
        } else {
            ResponseBody::Error(payload)
        };

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        if let Some(err) = request.build_error() {
            return Err(TransportError::Build(err.to_string()));
        }

        tokio::select! {
            biased;
            _ = request.context().cancelled() => Err(TransportError::Cancelled),
            result = self.dispatch(request) => result,
        }
    }
}

/// Empty bodies decode to `null` (e.g. `204 No Content`).
fn decode_json(status: u16, bytes: &[u8]) -> Result<JsonValue, TransportError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonValue::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| TransportError::Decode {
        status,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn success_payload_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/posts")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"userId": 100, "title": "test"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":101,"title":"test"}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let req = RequestDescriptor::builder(format!("{}/posts", server.url()))
            .method(Method::POST)
            .json_headers()
            .json_body(&json!({"userId": 100, "title": "test"}))
            .build();

        let resp = transport.send(&req).await.unwrap();

        mock.assert_async().await;
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body, ResponseBody::Data(json!({"id": 101, "title": "test"})));
        assert_eq!(
            resp.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn non_2xx_body_is_an_error_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body(r#"{"code":"NOT_FOUND","message":"no such post"}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let req = RequestDescriptor::builder(format!("{}/missing", server.url())).build();

        let resp = transport.send(&req).await.unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(
            resp.body,
            ResponseBody::Error(json!({"code": "NOT_FOUND", "message": "no such post"}))
        );
    }

    #[tokio::test]
    async fn empty_body_decodes_to_null() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/posts/1")
            .with_status(204)
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let req = RequestDescriptor::builder(format!("{}/posts/1", server.url()))
            .method(Method::DELETE)
            .build();

        let resp = transport.send(&req).await.unwrap();
        assert_eq!(resp.body, ResponseBody::Data(JsonValue::Null));
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/html")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let req = RequestDescriptor::builder(format!("{}/html", server.url())).build();

        let err = transport.send(&req).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode { status: 502, .. }));
    }

    #[tokio::test]
    async fn build_error_skips_the_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/").expect(0).create_async().await;

        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), 3u8);
        let req = RequestDescriptor::builder(server.url()).json_body(&bad).build();

        let err = HttpTransport::new().unwrap().send(&req).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, TransportError::Build(_)));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let req = RequestDescriptor::builder("http://127.0.0.1:9/never")
            .context(token)
            .build();

        let err = HttpTransport::new().unwrap().send(&req).await.unwrap_err();
        assert_eq!(err, TransportError::Cancelled);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(2)).unwrap();
        let req = RequestDescriptor::builder("http://127.0.0.1:1/unreachable").build();

        let err = transport.send(&req).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
