//! Expiration and backoff rules for subscription refreshes.
//!
//! Subscriptions store their schedule in seconds since the epoch while the
//! downloader works in milliseconds. All conversions between the two go
//! through [`secs_to_millis`] and [`millis_to_secs`]; the latter rounds so a
//! value that crosses the boundary repeatedly never drifts.
//!
//! # Overview
//!
//! After each successful download the list suggests an expiration interval
//! (or none, in which case [`DEFAULT_EXPIRATION_INTERVAL`] applies). The
//! [`ExpirationPolicy`] turns that interval into an [`ExpirationWindow`]:
//!
//! ```text
//! interval = clamp(interval, MIN_EXPIRATION_INTERVAL, MAX_EXPIRATION_INTERVAL)
//! soft     = now + round(interval * U[0.8, 1.2])
//! hard     = now + 2 * interval
//! ```
//!
//! A subscription becomes eligible for a refresh once `soft` has passed and
//! must be refreshed once `hard` has passed. Jitter on the soft expiration
//! spreads clients out so a popular list does not see synchronized peaks.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use listsync_core::expiration::{ExpirationPolicy, DEFAULT_EXPIRATION_INTERVAL};
//!
//! let policy = ExpirationPolicy::default();
//! let window = policy.process_interval(DEFAULT_EXPIRATION_INTERVAL, 1_000_000);
//! assert!(window.soft < window.hard);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, instrument};

use crate::download::Downloadable;

/// Milliseconds per second, the ratio between the two schedule units.
pub const MILLIS_IN_SECOND: u64 = 1000;

/// Interval used when a list does not declare one (5 days).
pub const DEFAULT_EXPIRATION_INTERVAL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Shortest expiration interval a list may request (1 hour).
pub const MIN_EXPIRATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Longest expiration interval a list may request (14 days).
pub const MAX_EXPIRATION_INTERVAL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Gap between checks after which the client is considered to have been offline (1 day).
pub const MAX_ABSENCE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum wait after a failed attempt before an automatic retry (1 day).
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lower bound of the soft-expiration jitter factor.
const JITTER_MIN: f64 = 0.8;

/// Upper bound of the soft-expiration jitter factor.
const JITTER_MAX: f64 = 1.2;

/// Absolute soft and hard expiration timestamps, in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationWindow {
    /// Refresh becomes eligible after this instant.
    pub soft: u64,
    /// Refresh becomes mandatory after this instant.
    pub hard: u64,
}

/// Converts seconds to milliseconds, saturating on overflow.
#[must_use]
pub fn secs_to_millis(secs: u64) -> u64 {
    secs.saturating_mul(MILLIS_IN_SECOND)
}

/// Converts milliseconds to seconds, rounding half up.
#[must_use]
pub fn millis_to_secs(millis: u64) -> u64 {
    millis / MILLIS_IN_SECOND + u64::from(millis % MILLIS_IN_SECOND >= MILLIS_IN_SECOND / 2)
}

/// Current wall-clock time in milliseconds since the epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// Current wall-clock time in seconds since the epoch, rounded.
#[must_use]
pub fn now_secs() -> u64 {
    millis_to_secs(now_millis())
}

/// Scheduling rules shared by the downloader and the synchronizer.
///
/// # Default Values
///
/// - `min_interval`: 1 hour
/// - `max_interval`: 14 days
/// - `max_absence`: 1 day
/// - `min_retry`: 1 day
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    min_interval: Duration,
    max_interval: Duration,
    max_absence: Duration,
    min_retry: Duration,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            min_interval: MIN_EXPIRATION_INTERVAL,
            max_interval: MAX_EXPIRATION_INTERVAL,
            max_absence: MAX_ABSENCE_INTERVAL,
            min_retry: MIN_RETRY_INTERVAL,
        }
    }
}

impl ExpirationPolicy {
    /// Creates a policy with custom bounds.
    ///
    /// `max_interval` is raised to `min_interval` if given smaller.
    #[must_use]
    pub fn new(
        min_interval: Duration,
        max_interval: Duration,
        max_absence: Duration,
        min_retry: Duration,
    ) -> Self {
        Self {
            min_interval,
            max_interval: max_interval.max(min_interval),
            max_absence,
            min_retry,
        }
    }

    /// Returns the longest interval a list may request.
    #[must_use]
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Computes the expiration window for a requested interval, starting at `now` (ms).
    #[must_use]
    #[instrument(level = "trace", skip(self))]
    pub fn process_interval(&self, interval: Duration, now: u64) -> ExpirationWindow {
        let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.window_with_factor(interval, now, factor)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn window_with_factor(&self, interval: Duration, now: u64, factor: f64) -> ExpirationWindow {
        let interval = interval.clamp(self.min_interval, self.max_interval);
        let interval_ms = interval.as_millis() as u64;
        let soft_offset = (interval_ms as f64 * factor).round() as u64;

        ExpirationWindow {
            soft: now.saturating_add(soft_offset),
            hard: now.saturating_add(interval_ms.saturating_mul(2)),
        }
    }

    /// Updates a downloadable's schedule for a check happening at `now` (ms).
    ///
    /// Pushes the soft expiration back by the length of a long absence, clamps
    /// expirations that lie implausibly far in the future and records `now`
    /// as the last check. The soft expiration never ends up past the hard one.
    #[allow(clippy::cast_possible_truncation)]
    pub fn refresh_check(&self, downloadable: &mut Downloadable, now: u64) {
        let max_absence = self.max_absence.as_millis() as u64;
        let max_interval = self.max_interval.as_millis() as u64;

        if downloadable.last_check > 0 && now.saturating_sub(downloadable.last_check) > max_absence
        {
            let absence = now - downloadable.last_check;
            debug!(
                url = %downloadable.url,
                absence_ms = absence,
                "long absence since last check, postponing soft expiration"
            );
            downloadable.soft_expiration = downloadable.soft_expiration.saturating_add(absence);
        }
        downloadable.last_check = now;

        let ceiling = now.saturating_add(max_interval);
        downloadable.hard_expiration = downloadable.hard_expiration.min(ceiling);
        downloadable.soft_expiration = downloadable
            .soft_expiration
            .min(ceiling)
            .min(downloadable.hard_expiration);
    }

    /// Returns true if the downloadable should be fetched at `now` (ms).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn is_due(&self, downloadable: &Downloadable, now: u64) -> bool {
        if downloadable.soft_expiration > now && downloadable.hard_expiration > now {
            return false;
        }

        if let Some(last_error) = downloadable.last_error
            && now.saturating_sub(last_error) < self.min_retry.as_millis() as u64
        {
            debug!(url = %downloadable.url, "last attempt failed recently, not retrying yet");
            return false;
        }

        true
    }
}
