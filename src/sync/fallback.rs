//! Fallback service client.
//!
//! After repeated automatic failures the synchronizer asks a fallback
//! service what happened to a subscription. The service answers with a
//! single line:
//!
//! ```text
//! 301 https://example.com/new-location.txt    moved, fetch this URL instead
//! 410                                          gone, retire the subscription
//! ```
//!
//! Anything else means "no advice". A retired subscription is redirected to
//! a `data:` URL holding its current filters, so the next download succeeds
//! locally and the list stops failing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::download::{ChannelStatus, DownloadError, HttpClient};
use crate::subscription::{DownloadStatus, is_http_url};

/// Matches `<code>` or `<code> <token>`.
#[allow(clippy::expect_used)]
static DIRECTIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\s+(\S+))?$").expect("directive regex is valid") // Static pattern, safe to panic
});

const MOVED_PERMANENTLY: &str = "301";
const GONE: &str = "410";

/// Header of the payload a retired subscription is redirected to.
const RETIRED_LIST_HEADER: &str = "[Adblock]";

/// Details of a failed download, substituted into the fallback URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRequest {
    /// Subscription URL (`%SUBSCRIPTION%`).
    pub subscription_url: String,
    /// Full URL that failed, including query parameters (`%URL%`).
    pub download_url: String,
    /// Status recorded for the failure (`%ERROR%`).
    pub error: DownloadStatus,
    /// Transport classification (`%CHANNELSTATUS%`).
    pub channel: ChannelStatus,
    /// HTTP status received, `0` if none (`%RESPONSESTATUS%`).
    pub response_status: u16,
}

/// Fills every placeholder of `template`, percent-encoding each value.
#[must_use]
pub fn build_fallback_url(template: &str, version: &str, request: &FallbackRequest) -> String {
    let response_status = request.response_status.to_string();
    let substitutions = [
        ("%VERSION%", version),
        ("%SUBSCRIPTION%", request.subscription_url.as_str()),
        ("%URL%", request.download_url.as_str()),
        ("%ERROR%", request.error.as_str()),
        ("%CHANNELSTATUS%", request.channel.as_str()),
        ("%RESPONSESTATUS%", response_status.as_str()),
    ];

    substitutions
        .iter()
        .fold(template.to_string(), |url, (placeholder, value)| {
            url.replace(placeholder, &urlencoding::encode(value))
        })
}

/// Advice returned by the fallback service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackDirective {
    /// The list moved to this `http(s)` URL.
    Moved(String),
    /// The list is gone for good.
    Gone,
}

impl FallbackDirective {
    /// Interprets a response body. Returns `None` for anything that is not advice.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let captures = DIRECTIVE_PATTERN.captures(body.trim())?;
        let target = captures.get(2).map(|m| m.as_str());

        match (&captures[1], target) {
            (MOVED_PERMANENTLY, Some(target)) if is_http_url(target) => {
                Some(Self::Moved(target.to_string()))
            }
            (GONE, _) => Some(Self::Gone),
            _ => None,
        }
    }

    /// The URL to fetch next, given the subscription's current filters.
    #[must_use]
    pub fn redirect_url(&self, filters: &[String]) -> String {
        match self {
            Self::Moved(url) => url.clone(),
            Self::Gone => retirement_url(filters),
        }
    }
}

/// Builds the `data:` URL that replaces a retired subscription's content.
#[must_use]
pub fn retirement_url(filters: &[String]) -> String {
    let mut data = String::from(RETIRED_LIST_HEADER);
    data.push('\n');
    data.push_str(&filters.join("\n"));
    format!("data:text/plain,{}", urlencoding::encode(&data))
}

/// Queries the fallback service.
#[derive(Debug, Clone)]
pub struct FallbackClient {
    client: HttpClient,
    template: String,
    version: String,
}

impl FallbackClient {
    /// Creates a client that fills `template` with `version` and request details.
    #[must_use]
    pub fn new(client: HttpClient, template: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client,
            template: template.into(),
            version: version.into(),
        }
    }

    /// Sends one uncached GET and interprets the body, whatever its HTTP status.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] if the filled template is not a valid URL or
    /// the request fails.
    #[instrument(skip(self, request), fields(url = %request.subscription_url))]
    pub async fn consult(
        &self,
        request: &FallbackRequest,
    ) -> Result<Option<FallbackDirective>, DownloadError> {
        let fallback_url = build_fallback_url(&self.template, &self.version, request);
        debug!(fallback_url = %fallback_url, "consulting fallback service");

        let response = self.client.get_text(&fallback_url).await?;
        let directive = FallbackDirective::parse(&response.body);
        debug!(status = response.status, directive = ?directive, "fallback service answered");
        Ok(directive)
    }
}
