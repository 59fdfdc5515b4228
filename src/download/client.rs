//! HTTP client wrapper for fetching filter lists.
//!
//! This module provides the `HttpClient` struct which performs uncached GET
//! requests with timeouts, a body size limit and local decoding of `data:` URLs.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, CONTENT_LENGTH, PRAGMA};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_BODY_SIZE, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

const DATA_SCHEME: &str = "data:";

/// A response body together with the HTTP status it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedText {
    /// HTTP status code (`200` for decoded `data:` URLs).
    pub status: u16,
    /// Body decoded as UTF-8, invalid sequences replaced.
    pub body: String,
}

/// HTTP client for list downloads and fallback queries.
///
/// This client is designed to be created once and reused for every request,
/// taking advantage of connection pooling. It never stores cookies.
///
/// # Example
///
/// ```no_run
/// use listsync_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let body = client.fetch_text("https://example.com/list.txt").await?;
/// println!("{} bytes", body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_body_size: usize,
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - Gzip decompression: enabled
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the underlying client cannot be built.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the underlying client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self {
            client,
            max_body_size: MAX_BODY_SIZE,
        })
    }

    /// Overrides the body size limit.
    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Fetches a list body, treating anything but HTTP 200 as an error.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid or not `http`, `https` or `data`
    /// - The request fails (network error, timeout)
    /// - The server returns a status other than 200
    /// - The body exceeds the size limit
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        let fetched = self.get_text(url).await?;
        if fetched.status != 200 {
            return Err(DownloadError::http_status(url, fetched.status));
        }
        Ok(fetched.body)
    }

    /// Fetches a body regardless of the HTTP status.
    ///
    /// Requests carry `Cache-Control: no-cache` and `Pragma: no-cache` so
    /// intermediaries never serve a stale list.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_text`](Self::fetch_text), except that non-200 statuses
    /// are returned in [`FetchedText::status`].
    pub async fn get_text(&self, url: &str) -> Result<FetchedText, DownloadError> {
        if has_data_scheme(url) {
            let body = decode_data_url(url)?;
            return Ok(FetchedText { status: 200, body });
        }

        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        debug!("sending request");
        let response = self
            .client
            .get(parsed)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status().as_u16();
        let declared_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared_length.is_some_and(|len| len > self.max_body_size as u64) {
            return Err(DownloadError::too_large(url, self.max_body_size));
        }

        let body = read_limited(response, url, self.max_body_size).await?;
        debug!(status, bytes = body.len(), "response received");

        Ok(FetchedText {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Streams the response body into memory, aborting once it exceeds `limit`.
async fn read_limited(
    response: reqwest::Response,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, DownloadError> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        if body.len() + chunk.len() > limit {
            return Err(DownloadError::too_large(url, limit));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

pub(super) fn has_data_scheme(url: &str) -> bool {
    url.as_bytes()
        .get(..DATA_SCHEME.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(DATA_SCHEME.as_bytes()))
}

/// Decodes a percent-encoded `data:` URL into its text payload.
///
/// Only the plain (non-base64) form is supported.
fn decode_data_url(url: &str) -> Result<String, DownloadError> {
    let rest = &url[DATA_SCHEME.len()..];
    let Some((media_type, data)) = rest.split_once(',') else {
        return Err(DownloadError::invalid_url(url));
    };
    if media_type
        .split(';')
        .any(|param| param.trim().eq_ignore_ascii_case("base64"))
    {
        return Err(DownloadError::invalid_url(url));
    }
    Ok(String::from_utf8_lossy(&urlencoding::decode_binary(data.as_bytes())).into_owned())
}
