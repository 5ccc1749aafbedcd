//! HTTP client abstraction for the long-polling transport.
//!
//! The polling transport only needs `GET` and `POST` with a body, so the
//! client is hidden behind [`HttpClient`]. [`ReqwestHttpClient`] is the
//! default implementation.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Content type of plain-text packet bodies.
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=UTF-8";

/// Content type of binary packet bodies.
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

// ============================================================================
// HttpResponse
// ============================================================================

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a `200 OK` response.
    #[inline]
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// HttpClient
// ============================================================================

/// A minimal async HTTP client.
///
/// Implementations own connection pooling and TLS; transport errors are
/// reported as [`crate::Error`], non-success statuses as a normal response.
#[async_trait]
pub trait HttpClient: Clone + Send + Sync + 'static {
    /// Sends a `GET` request.
    async fn get(&self, url: Url) -> Result<HttpResponse>;

    /// Sends a `POST` request with the given content type and body.
    async fn post(&self, url: Url, content_type: &'static str, body: Vec<u8>)
    -> Result<HttpResponse>;
}

// ============================================================================
// ReqwestHttpClient
// ============================================================================

/// A [`reqwest`]-backed implementation of [`HttpClient`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a client with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Http`] if the client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { inner })
    }

    /// Wraps an existing [`reqwest::Client`].
    #[inline]
    #[must_use]
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: Url) -> Result<HttpResponse> {
        let response = self.inner.get(url).send().await?;
        Self::read(response).await
    }

    async fn post(
        &self,
        url: Url,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        let response = self
            .inner
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        Self::read(response).await
    }
}

// ============================================================================
// Tests
// ============================================================================
