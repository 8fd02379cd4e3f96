//! Network transport for download tasks.
//!
//! The [`Transport`] trait is the seam between the download task and the
//! network: issue one GET (with optional User-Agent override and basic
//! auth) and hand back the response body as a byte stream. [`HttpClient`]
//! is the reqwest-backed implementation used in production.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::credentials::Credentials;
use super::error::DownloadError;
use crate::user_agent;

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, DownloadError>> + Send>>;

/// One GET request as seen by a [`Transport`].
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// The URL to fetch.
    pub url: &'a str,
    /// Overrides the transport's default User-Agent.
    pub user_agent: Option<&'a str>,
    /// Basic-auth credentials.
    pub credentials: Option<&'a Credentials>,
}

impl<'a> FetchRequest<'a> {
    /// Creates a plain GET request with no overrides.
    #[must_use]
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            user_agent: None,
            credentials: None,
        }
    }
}

/// Issues a GET and returns the response body.
///
/// Implementations report non-success responses as
/// [`DownloadError::HttpStatus`] so the retrier can tell transient
/// statuses (5xx, 408, 429) from permanent ones.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `request.url`.
    ///
    /// # Errors
    ///
    /// Returns a transport [`DownloadError`] (network, timeout, HTTP status)
    /// or [`DownloadError::InvalidUrl`].
    async fn get(&self, request: FetchRequest<'_>) -> Result<BodyStream, DownloadError>;
}

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and reused for multiple downloads,
/// taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use bulkget_core::download::{FetchRequest, HttpClient, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let body = client.get(FetchRequest::new("https://example.com/file.pdf")).await?;
/// # drop(body);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    /// - Gzip decompression: enabled
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn get(&self, request: FetchRequest<'_>) -> Result<BodyStream, DownloadError> {
        let url = request.url;
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut builder = self.client.get(url);
        if let Some(ua) = request.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, ua);
        }
        if let Some(credentials) = request.credentials {
            builder = builder.basic_auth(credentials.username(), Some(credentials.password()));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        debug!(status = status.as_u16(), content_length = ?response.content_length(), "response received");

        let owned_url = url.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(owned_url.clone())
                } else {
                    DownloadError::network(owned_url.clone(), e)
                }
            })
        });
        Ok(Box::pin(stream))
    }
}

/// Collects a body stream into memory.
///
/// # Errors
///
/// Returns the first chunk error from the stream.
pub(crate) async fn read_body(mut body: BodyStream) -> Result<Vec<u8>, DownloadError> {
    let mut buffer = Vec::new();
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}
