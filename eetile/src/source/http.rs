//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent sent with every tile request.
const DEFAULT_USER_AGENT: &str = concat!("eetile/", env!("CARGO_PKG_VERSION"));

/// Raw response from a tile server.
///
/// Non-2xx responses are returned as values, not errors, so the caller can
/// classify them (auth, transient, permanent).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: None,
        }
    }

    /// Sets the `Content-Type` header value.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// Request or read timed out
    Timeout,
    /// Could not establish a connection
    Connect,
    /// Connection dropped while reading the body
    Body,
    /// Anything else (client construction, redirect loops, ...)
    Other,
}

/// Transport failure before a complete response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct HttpError {
    pub kind: HttpErrorKind,
    pub message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            HttpErrorKind::Timeout
        } else if e.is_connect() {
            HttpErrorKind::Connect
        } else if e.is_body() || e.is_decode() {
            HttpErrorKind::Body
        } else {
            HttpErrorKind::Other
        };
        // Strip the URL so error messages stay short in logs
        Self::new(kind, e.without_url().to_string())
    }
}

/// Trait for asynchronous HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait AsyncHttpClient: Send + Sync + 'static {
    /// Performs an async HTTP GET request with Bearer token authentication.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    /// * `bearer_token` - The bearer token for the Authorization header
    ///
    /// # Returns
    ///
    /// The response, whatever its status, or a transport error.
    fn get_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
    ) -> impl Future<Output = Result<HttpResponse, HttpError>> + Send;
}

/// Async HTTP client implementation using reqwest.
///
/// Connections are pooled per host, so tiles fetched from the same server
/// reuse warm connections.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a new AsyncReqwestClient with default configuration.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new AsyncReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                HttpError::new(
                    HttpErrorKind::Other,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get_with_bearer(
        &self,
        url: &str,
        bearer_token: &str,
    ) -> Result<HttpResponse, HttpError> {
        trace!(url = url, "HTTP GET request starting");

        let response = self
            .client
            .get(url)
            .bearer_auth(bearer_token)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await?;

        trace!(url = url, status, bytes = body.len(), "HTTP GET request finished");

        Ok(HttpResponse {
            status,
            body,
            content_type,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    /// Scripted HTTP client for testing.
    ///
    /// Replays queued responses in order, then repeats `fallback`. Every call
    /// is recorded before it waits on the gate, so tests can observe dispatch
    /// order while holding responses back.
    pub struct MockHttpClient {
        script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
        fallback: Result<HttpResponse, HttpError>,
        calls: Mutex<Vec<(String, String)>>,
        gate: Arc<Semaphore>,
    }

    impl MockHttpClient {
        /// Client that answers every request with `fallback`.
        pub fn new(fallback: Result<HttpResponse, HttpError>) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback,
                calls: Mutex::new(Vec::new()),
                gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            }
        }

        /// Client that answers every request with HTTP 200 and `body`.
        pub fn ok(body: &'static [u8]) -> Self {
            Self::new(Ok(HttpResponse::new(200, Bytes::from_static(body))))
        }

        /// Client that answers every request with `status` and no body.
        pub fn status(status: u16) -> Self {
            Self::new(Ok(HttpResponse::new(status, Bytes::new())))
        }

        /// Queues responses served before the fallback.
        pub fn with_script(self, script: Vec<Result<HttpResponse, HttpError>>) -> Self {
            *self.script.lock() = script.into();
            self
        }

        /// Holds every response until [`release`](Self::release) is called.
        pub fn gated(mut self) -> Self {
            self.gate = Arc::new(Semaphore::new(0));
            self
        }

        /// Lets `count` held responses through.
        pub fn release(&self, count: usize) {
            self.gate.add_permits(count);
        }

        /// Recorded `(url, bearer_token)` pairs in call order.
        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl AsyncHttpClient for Arc<MockHttpClient> {
        async fn get_with_bearer(
            &self,
            url: &str,
            bearer_token: &str,
        ) -> Result<HttpResponse, HttpError> {
            self.calls
                .lock()
                .push((url.to_string(), bearer_token.to_string()));

            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }

            let scripted = self.script.lock().pop_front();
            scripted.unwrap_or_else(|| self.fallback.clone())
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock = Arc::new(MockHttpClient::ok(&[1, 2, 3, 4]));

        let response = mock.get_with_bearer("http://example.com", "t").await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.body.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(
            mock.calls(),
            vec![("http://example.com".to_string(), "t".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mock_client_script_then_fallback() {
        let mock = Arc::new(MockHttpClient::status(200).with_script(vec![
            Ok(HttpResponse::new(503, Bytes::new())),
            Err(HttpError::new(HttpErrorKind::Timeout, "timed out")),
        ]));

        assert_eq!(mock.get_with_bearer("u", "t").await.unwrap().status, 503);
        assert!(mock.get_with_bearer("u", "t").await.is_err());
        assert_eq!(mock.get_with_bearer("u", "t").await.unwrap().status, 200);
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, Bytes::new()).is_success());
        assert!(HttpResponse::new(204, Bytes::new()).is_success());
        assert!(!HttpResponse::new(301, Bytes::new()).is_success());
        assert!(!HttpResponse::new(401, Bytes::new()).is_success());
    }

    #[test]
    fn test_http_error_display() {
        let error = HttpError::new(HttpErrorKind::Connect, "connection refused");
        assert_eq!(error.to_string(), "Connect: connection refused");
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(AsyncReqwestClient::with_timeout(5).is_ok());
    }
}
