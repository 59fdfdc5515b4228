//! Subscription change notifications.

use std::fmt;

use tokio::sync::broadcast;
use tracing::trace;

use crate::subscription::{DownloadStatus, Subscription};

/// Default buffered notifications per receiver.
pub const DEFAULT_CAPACITY: usize = 64;

/// Something that happened to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// A download started.
    Downloading,
    /// A downloaded list was applied.
    Updated,
    /// A download failed or its content was rejected.
    DownloadFailed,
}

impl SubscriptionEvent {
    /// Returns the topic name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "subscription.downloading",
            Self::Updated => "subscription.updated",
            Self::DownloadFailed => "subscription.download_failed",
        }
    }
}

impl fmt::Display for SubscriptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A published event with the subscription state it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// What happened.
    pub event: SubscriptionEvent,
    /// Subscription URL.
    pub url: String,
    /// Download status at publish time.
    pub download_status: Option<DownloadStatus>,
}

/// Receiver of subscription events.
pub trait Notifier: Send + Sync {
    /// Publishes `event` for `subscription`. Must not block.
    fn publish(&self, event: SubscriptionEvent, subscription: &Subscription);
}

/// [`Notifier`] fanning events out over a Tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastNotifier {
    /// Creates a notifier buffering `capacity` events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns a new receiver of every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: SubscriptionEvent, subscription: &Subscription) {
        let notification = Notification {
            event,
            url: subscription.url.clone(),
            download_status: subscription.download_status,
        };
        // No receivers is not an error.
        if self.sender.send(notification).is_err() {
            trace!(event = %event, url = %subscription.url, "no notification receivers");
        }
    }
}
