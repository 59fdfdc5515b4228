//! Mapping between stored subscriptions and per-attempt downloadables.
//!
//! Subscriptions keep their schedule in seconds, downloadables in
//! milliseconds. Conversions go through [`secs_to_millis`] and
//! [`millis_to_secs`] so repeated round trips are stable.

use crate::download::Downloadable;
use crate::expiration::{millis_to_secs, secs_to_millis};
use crate::subscription::Subscription;

/// Projects a subscription into a downloadable for one fetch attempt.
///
/// `last_error` is set only when the last download differs from the last
/// success, i.e. when the most recent attempt failed.
#[must_use]
pub fn to_downloadable(subscription: &Subscription, manual: bool) -> Downloadable {
    let last_error = (subscription.last_download != subscription.last_success)
        .then(|| secs_to_millis(subscription.last_download));

    Downloadable {
        url: subscription.url.clone(),
        redirect_url: None,
        last_error,
        last_check: secs_to_millis(subscription.last_check),
        last_version: subscription.version,
        soft_expiration: secs_to_millis(subscription.soft_expiration),
        hard_expiration: secs_to_millis(subscription.hard_expiration),
        download_count: subscription.download_count,
        manual,
    }
}

/// Schedule fields the downloader may change, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleUpdate {
    /// Last scheduler check.
    pub last_check: u64,
    /// Soft expiration.
    pub soft_expiration: u64,
    /// Hard expiration.
    pub hard_expiration: u64,
}

impl ScheduleUpdate {
    /// Reads the schedule back from a downloadable, rounding to seconds.
    #[must_use]
    pub fn from_downloadable(downloadable: &Downloadable) -> Self {
        Self {
            last_check: millis_to_secs(downloadable.last_check),
            soft_expiration: millis_to_secs(downloadable.soft_expiration),
            hard_expiration: millis_to_secs(downloadable.hard_expiration),
        }
    }

    /// Writes the schedule onto `subscription`. Nothing else is touched.
    pub fn apply_to(&self, subscription: &mut Subscription) {
        subscription.last_check = self.last_check;
        subscription.soft_expiration = self.soft_expiration;
        subscription.hard_expiration = self.hard_expiration;
    }
}
