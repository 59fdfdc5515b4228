//! Error types for the download module.
//!
//! Every transport failure is eventually reported to the
//! [`DownloadHandler`](super::DownloadHandler) as a [`DownloadFailure`], which
//! carries the persisted status plus the channel and response classification
//! forwarded to the fallback service.

use thiserror::Error;

use super::{ChannelStatus, DownloadFailure};
use crate::subscription::DownloadStatus;

/// Errors that can occur while fetching a list.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The server answered with something other than 200.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The URL is malformed, uses an unsupported scheme, or is an undecodable `data:` URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The response body exceeded the size limit.
    #[error("response from {url} exceeds {limit} bytes")]
    ResponseTooLarge {
        /// The URL whose body was too large.
        url: String,
        /// The enforced limit in bytes.
        limit: usize,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a response-too-large error.
    pub fn too_large(url: impl Into<String>, limit: usize) -> Self {
        Self::ResponseTooLarge {
            url: url.into(),
            limit,
        }
    }

    /// Status recorded on the subscription for this error.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        match self {
            Self::InvalidUrl { .. } => DownloadStatus::InvalidUrl,
            _ => DownloadStatus::ConnectionError,
        }
    }

    /// Transport-level classification of this error.
    #[must_use]
    pub fn channel_status(&self) -> ChannelStatus {
        match self {
            Self::Network { source, .. } => ChannelStatus::from_reqwest(source),
            Self::Timeout { .. } => ChannelStatus::Timeout,
            Self::HttpStatus { .. } => ChannelStatus::Ok,
            Self::InvalidUrl { .. } => ChannelStatus::InvalidUrl,
            Self::ResponseTooLarge { .. } => ChannelStatus::Body,
            Self::Client(_) => ChannelStatus::Other,
        }
    }

    /// HTTP status received before the failure, `0` if none.
    #[must_use]
    pub fn response_status(&self) -> u16 {
        match self {
            Self::HttpStatus { status, .. } => *status,
            Self::Network { source, .. } => source.status().map_or(0, |s| s.as_u16()),
            _ => 0,
        }
    }

    /// Converts this error into the report handed to the download handler.
    #[must_use]
    pub fn to_failure(&self, download_url: impl Into<String>) -> DownloadFailure {
        DownloadFailure {
            status: self.status(),
            download_url: download_url.into(),
            channel: self.channel_status(),
            response_status: self.response_status(),
        }
    }
}

// No `From<reqwest::Error>`: every variant needs the URL for context, which the
// source error does not reliably carry. Use the constructor helpers instead.
