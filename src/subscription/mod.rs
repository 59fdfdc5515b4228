//! Subscription records and the stores that own them.
//!
//! A [`Subscription`] is addressed by its URL. The synchronizer loads a copy
//! from a [`SubscriptionStore`], mutates it and writes it back; membership in
//! the active set (`listed`) is maintained by the store itself.
//!
//! # Overview
//!
//! - [`Subscription`] - Scheduling metadata plus descriptive fields
//! - [`DownloadStatus`] - Outcome of the most recent download attempt
//! - [`SubscriptionStore`] - Storage seam used by the synchronizer
//! - [`MemoryStore`] - Process-local store
//! - [`SqliteStore`] - `SQLite`-backed store that survives restarts

mod error;
mod sqlite;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::StoreError;
pub use sqlite::SqliteStore;
pub use store::{MemoryStore, SubscriptionStore};

/// Prefix marking user-defined subscriptions, which are never downloaded.
const USER_DEFINED_PREFIX: char = '~';

/// Outcome of the most recent download attempt of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    /// The list was downloaded and applied.
    #[serde(rename = "synchronize_ok")]
    Ok,
    /// The URL could not be requested at all.
    #[serde(rename = "synchronize_invalid_url")]
    InvalidUrl,
    /// Network failure or non-200 response.
    #[serde(rename = "synchronize_connection_error")]
    ConnectionError,
    /// The response was not a valid filter list.
    #[serde(rename = "synchronize_invalid_data")]
    InvalidData,
}

impl DownloadStatus {
    /// Returns the persisted string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "synchronize_ok",
            Self::InvalidUrl => "synchronize_invalid_url",
            Self::ConnectionError => "synchronize_connection_error",
            Self::InvalidData => "synchronize_invalid_data",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synchronize_ok" => Ok(Self::Ok),
            "synchronize_invalid_url" => Ok(Self::InvalidUrl),
            "synchronize_connection_error" => Ok(Self::ConnectionError),
            "synchronize_invalid_data" => Ok(Self::InvalidData),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// Whether a subscription is fetched from its URL or maintained locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Remotely hosted list, refreshed by the synchronizer.
    Downloadable,
    /// Locally edited list (URL starts with `~`).
    UserDefined,
}

impl SubscriptionKind {
    /// Infers the kind from a subscription URL.
    #[must_use]
    pub fn for_url(url: &str) -> Self {
        if url.starts_with(USER_DEFINED_PREFIX) {
            Self::UserDefined
        } else {
            Self::Downloadable
        }
    }

    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloadable => "downloadable",
            Self::UserDefined => "user_defined",
        }
    }
}

/// A filter-list subscription and its refresh schedule.
///
/// All timestamps are seconds since the Unix epoch; `0` means "never".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier and download location.
    pub url: String,
    /// Downloadable or user-defined.
    pub kind: SubscriptionKind,
    /// Display title; defaults to the URL.
    pub title: String,
    /// True when the title was declared by the list itself.
    pub fixed_title: bool,
    /// Disabled subscriptions are still refreshed but not applied by consumers.
    pub disabled: bool,
    /// Homepage declared by the list, validated as http(s).
    pub homepage: Option<String>,
    /// Last time the scheduler looked at this subscription.
    pub last_check: u64,
    /// Last download attempt, successful or not.
    pub last_download: u64,
    /// Last successful download.
    pub last_success: u64,
    /// Refresh becomes eligible after this instant.
    pub soft_expiration: u64,
    /// Refresh becomes mandatory after this instant.
    pub hard_expiration: u64,
    /// Outcome of the last attempt.
    pub download_status: Option<DownloadStatus>,
    /// Consecutive automatic failures since the last success or fallback check.
    pub errors: u32,
    /// Successful downloads so far (advisory, reported to the server capped at `4+`).
    pub download_count: u32,
    /// Content version declared by the last applied list.
    pub version: u64,
    /// Minimum client version declared by the list header.
    pub required_version: Option<String>,
    /// Filter lines of the last applied list.
    pub filters: Vec<String>,
    /// Member of the active set. Maintained by the store.
    pub listed: bool,
}

impl Subscription {
    /// Creates an unlisted subscription with an empty schedule.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            kind: SubscriptionKind::for_url(&url),
            title: url.clone(),
            url,
            fixed_title: false,
            disabled: false,
            homepage: None,
            last_check: 0,
            last_download: 0,
            last_success: 0,
            soft_expiration: 0,
            hard_expiration: 0,
            download_status: None,
            errors: 0,
            download_count: 0,
            version: 0,
            required_version: None,
            filters: Vec::new(),
            listed: false,
        }
    }

    /// Returns true if the synchronizer may fetch this subscription.
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        self.kind == SubscriptionKind::Downloadable
    }

    /// Returns true if the URL is an `http://` or `https://` URL.
    #[must_use]
    pub fn has_http_url(&self) -> bool {
        is_http_url(&self.url)
    }
}

/// Case-insensitive check for an `http://` or `https://` prefix.
#[must_use]
pub fn is_http_url(url: &str) -> bool {
    let bytes = url.as_bytes();
    let has_prefix = |prefix: &[u8]| {
        bytes
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    has_prefix(b"http://") || has_prefix(b"https://")
}
