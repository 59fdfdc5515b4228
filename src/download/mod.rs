//! List downloads and the refresh scheduler.
//!
//! This module owns the transport side of synchronization: deciding on each
//! tick which subscriptions are due, fetching them, following redirects and
//! reporting every outcome to a [`DownloadHandler`].
//!
//! # Features
//!
//! - One in-flight download per URL; re-submission is a no-op
//! - Absence compensation, clock clamping and retry backoff
//! - Content and fallback redirects followed up to [`MAX_REDIRECTS`]
//! - Client identification appended to every list request
//! - Configurable timeouts (30s connect, 5min read by default)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use listsync_core::config::SyncConfig;
//! use listsync_core::download::{Downloadable, Downloader, HttpDownloader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Arc::new(HttpDownloader::from_config(&SyncConfig::default())?);
//! downloader.download(Downloadable::new("https://example.com/list.txt"));
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;

pub use client::{FetchedText, HttpClient};
pub use constants::{
    CHECK_INTERVAL, CONNECT_TIMEOUT_SECS, DOWNLOAD_COUNT_CAP, INITIAL_DELAY, MAX_BODY_SIZE,
    MAX_REDIRECTS, READ_TIMEOUT_SECS,
};
pub use engine::{HttpDownloader, Schedule, build_download_url};
pub use error::DownloadError;

use crate::expiration::ExpirationWindow;
use crate::subscription::DownloadStatus;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.

/// One fetch attempt's view of a subscription.
///
/// All timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloadable {
    /// Subscription URL; identifies the subscription.
    pub url: String,
    /// URL actually fetched after a content or fallback redirect.
    pub redirect_url: Option<String>,
    /// Time of the last failed attempt, if the last attempt failed.
    pub last_error: Option<u64>,
    /// Time of the last scheduler check.
    pub last_check: u64,
    /// Version of the last applied list.
    pub last_version: u64,
    /// Refresh becomes eligible after this instant.
    pub soft_expiration: u64,
    /// Refresh becomes mandatory after this instant.
    pub hard_expiration: u64,
    /// Successful downloads so far.
    pub download_count: u32,
    /// User-initiated; suppresses error counting and the fallback service.
    pub manual: bool,
}

impl Downloadable {
    /// Creates a never-checked, automatic downloadable for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            redirect_url: None,
            last_error: None,
            last_check: 0,
            last_version: 0,
            soft_expiration: 0,
            hard_expiration: 0,
            download_count: 0,
            manual: false,
        }
    }

    /// The URL to request: the redirect target if one was followed.
    #[must_use]
    pub fn effective_url(&self) -> &str {
        self.redirect_url.as_deref().unwrap_or(&self.url)
    }
}

/// Transport-level classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The transport completed; the failure is in the response.
    Ok,
    /// Connection could not be established.
    Connect,
    /// The request timed out.
    Timeout,
    /// Too many HTTP redirects or a redirect loop.
    Redirect,
    /// Reading the body failed or it was too large.
    Body,
    /// The body could not be decoded.
    Decode,
    /// The request could not be sent.
    Request,
    /// The URL could not be requested at all.
    InvalidUrl,
    /// Anything else.
    Other,
}

impl ChannelStatus {
    /// Classifies a reqwest error.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_redirect() {
            Self::Redirect
        } else if error.is_body() {
            Self::Body
        } else if error.is_decode() {
            Self::Decode
        } else if error.is_request() {
            Self::Request
        } else if error.is_status() {
            Self::Ok
        } else {
            Self::Other
        }
    }

    /// Returns the label sent to the fallback service.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Redirect => "redirect",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Request => "request",
            Self::InvalidUrl => "invalid_url",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the handler learns about a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    /// Status recorded on the subscription.
    pub status: DownloadStatus,
    /// The full URL that was requested, including query parameters.
    pub download_url: String,
    /// Transport classification.
    pub channel: ChannelStatus,
    /// HTTP status received, `0` if none.
    pub response_status: u16,
}

/// What the handler decided after receiving a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessOutcome {
    /// The list was applied.
    Applied,
    /// The body was rejected; report it as a failure with this status.
    Invalid(DownloadStatus),
    /// The list moved; fetch this URL instead.
    Redirect(String),
}

/// Receiver of scheduling queries and download events.
///
/// Handlers never fail: problems are recorded on the subscription. Return
/// values are the continuations the downloader acts on.
#[async_trait]
pub trait DownloadHandler: Send + Sync {
    /// Downloadables to consider on this tick.
    async fn due_downloadables(&self) -> Vec<Downloadable>;

    /// The downloader adjusted the schedule of `downloadable`.
    async fn on_expiration_change(&self, downloadable: &Downloadable);

    /// A request for `downloadable` is about to be sent.
    async fn on_download_started(&self, downloadable: &Downloadable);

    /// A body arrived with HTTP 200.
    async fn on_download_success(&self, downloadable: &Downloadable, body: &str)
    -> SuccessOutcome;

    /// The attempt failed. `redirect_allowed` is false once the redirect budget
    /// is spent; a returned URL is fetched next only when it is true.
    async fn on_download_error(
        &self,
        downloadable: &Downloadable,
        failure: &DownloadFailure,
        redirect_allowed: bool,
    ) -> Option<String>;
}

/// Fetches downloadables and drives the refresh schedule.
pub trait Downloader: Send + Sync {
    /// Starts the periodic scheduler, reporting to `handler`.
    fn start(&self, handler: Weak<dyn DownloadHandler>);

    /// Submits a download. Returns false if the URL is already in flight or
    /// the downloader was cancelled.
    fn download(&self, downloadable: Downloadable) -> bool;

    /// Returns true if a download for `url` is in flight.
    fn is_downloading(&self, url: &str) -> bool;

    /// Stops the scheduler and all in-flight downloads.
    fn cancel(&self);

    /// Turns a suggested interval into absolute expiration times (ms).
    fn process_expiration_interval(&self, interval: Duration) -> ExpirationWindow;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_url_prefers_redirect() {
        let mut downloadable = Downloadable::new("https://a.example/list.txt");
        assert_eq!(downloadable.effective_url(), "https://a.example/list.txt");

        downloadable.redirect_url = Some("https://b.example/list.txt".to_string());
        assert_eq!(downloadable.effective_url(), "https://b.example/list.txt");
    }

    #[test]
    fn test_channel_status_labels() {
        assert_eq!(ChannelStatus::Ok.to_string(), "ok");
        assert_eq!(ChannelStatus::InvalidUrl.as_str(), "invalid_url");
    }
}
