//! The synchronization coordinator.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::fallback::{FallbackClient, FallbackRequest};
use super::projection::{ScheduleUpdate, to_downloadable};
use crate::config::SyncConfig;
use crate::download::{
    DownloadError, DownloadFailure, DownloadHandler, Downloadable, Downloader, HttpClient,
    SuccessOutcome,
};
use crate::expiration::{
    DEFAULT_EXPIRATION_INTERVAL, MILLIS_IN_SECOND, millis_to_secs, now_secs, secs_to_millis,
};
use crate::notify::{Notifier, SubscriptionEvent};
use crate::parser::{AdblockParser, ListParser, ParsedList};
use crate::shutdown::Shutdown;
use crate::subscription::{DownloadStatus, StoreError, Subscription, SubscriptionStore};

/// Keeps subscriptions up to date through a [`Downloader`].
///
/// Handler bodies run one at a time under an internal lock, so store
/// updates never interleave. The lock is released while the fallback
/// service is queried.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use listsync_core::config::SyncConfig;
/// use listsync_core::download::HttpDownloader;
/// use listsync_core::notify::BroadcastNotifier;
/// use listsync_core::shutdown::Shutdown;
/// use listsync_core::subscription::MemoryStore;
/// use listsync_core::sync::Synchronizer;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SyncConfig::default();
/// let synchronizer = Arc::new(Synchronizer::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(HttpDownloader::from_config(&config)?),
///     Arc::new(BroadcastNotifier::default()),
///     config,
///     Arc::new(Shutdown::new()),
/// )?);
/// synchronizer.initialize();
/// # Ok(())
/// # }
/// ```
pub struct Synchronizer {
    store: Arc<dyn SubscriptionStore>,
    downloader: Arc<dyn Downloader>,
    notifier: Arc<dyn Notifier>,
    parser: Arc<dyn ListParser>,
    config: SyncConfig,
    shutdown: Arc<Shutdown>,
    fallback: FallbackClient,
    handler_lock: Mutex<()>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Creates a synchronizer parsing lists with [`AdblockParser`].
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the fallback HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        downloader: Arc<dyn Downloader>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
        shutdown: Arc<Shutdown>,
    ) -> Result<Self, DownloadError> {
        let client =
            HttpClient::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)?;
        let fallback = FallbackClient::new(
            client,
            config.fallback_url_template.clone(),
            config.client.addon_version.clone(),
        );
        Ok(Self {
            store,
            downloader,
            notifier,
            parser: Arc::new(AdblockParser),
            config,
            shutdown,
            fallback,
            handler_lock: Mutex::new(()),
        })
    }

    /// Replaces the list parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn ListParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Registers with the downloader and cancels it on shutdown.
    pub fn initialize(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handler: Weak<dyn DownloadHandler> = weak;
        self.downloader.start(handler);

        let downloader = Arc::clone(&self.downloader);
        self.shutdown.add(move || downloader.cancel());
        info!(
            auto_update = self.config.auto_update,
            fallback_error_threshold = self.config.fallback_error_threshold,
            "synchronizer initialized"
        );
    }

    /// Returns true if `url` is being downloaded.
    #[must_use]
    pub fn is_in_progress(&self, url: &str) -> bool {
        self.downloader.is_downloading(url)
    }

    /// Starts downloading `subscription`. Manual downloads never count as
    /// errors and never consult the fallback service.
    ///
    /// Returns false if a download for the URL is already running.
    pub fn trigger_download(&self, subscription: &Subscription, manual: bool) -> bool {
        debug!(url = %subscription.url, manual, "download requested");
        self.downloader
            .download(to_downloadable(subscription, manual))
    }

    /// Applies a downloaded list to the target subscription and saves it.
    async fn apply_list(
        &self,
        downloadable: &Downloadable,
        parsed: ParsedList,
    ) -> Result<Subscription, StoreError> {
        let mut subscription = self.store.lookup(downloadable.effective_url()).await?;

        let mut replaced = None;
        if let Some(redirect_url) = downloadable
            .redirect_url
            .as_deref()
            .filter(|redirect_url| *redirect_url != downloadable.url)
        {
            let previous = self.store.lookup(&downloadable.url).await?;
            info!(from = %previous.url, to = %redirect_url, "subscription moved");
            subscription.title.clone_from(&previous.title);
            subscription.disabled = previous.disabled;
            subscription.last_check = previous.last_check;
            if previous.listed {
                replaced = Some(previous.url);
            }
        }

        let now = now_secs();
        subscription.last_success = now;
        subscription.last_download = now;
        subscription.download_status = Some(DownloadStatus::Ok);
        subscription.download_count = downloadable.download_count;
        subscription.errors = 0;

        if let Some(homepage) = parsed.homepage() {
            if is_valid_homepage(homepage) {
                subscription.homepage = Some(homepage.to_string());
            } else {
                debug!(homepage, "ignoring homepage that is not an http(s) URL");
            }
        }

        let interval = match parsed.finalize(&mut subscription) {
            0 => DEFAULT_EXPIRATION_INTERVAL,
            secs => Duration::from_secs(secs),
        };
        let window = self.downloader.process_expiration_interval(interval);
        subscription.soft_expiration = millis_to_secs(window.soft);
        subscription.hard_expiration = millis_to_secs(window.hard);

        match replaced {
            Some(old_url) => {
                self.store.replace(&old_url, &subscription).await?;
                subscription.listed = true;
            }
            None => self.store.save(&subscription).await?,
        }
        Ok(subscription)
    }

    /// Records a failed attempt. Returns the fallback query to send, if the
    /// failure warrants one.
    async fn record_failure(
        &self,
        downloadable: &Downloadable,
        failure: &DownloadFailure,
        redirect_allowed: bool,
    ) -> Result<Option<FallbackRequest>, StoreError> {
        let mut subscription = self.store.lookup(&downloadable.url).await?;
        subscription.last_download = now_secs();
        subscription.download_status = Some(failure.status);

        let mut request = None;
        if !downloadable.manual {
            subscription.errors = subscription.errors.saturating_add(1);

            if redirect_allowed
                && subscription.errors >= self.config.fallback_error_threshold
                && subscription.has_http_url()
            {
                subscription.errors = 0;
                request = Some(FallbackRequest {
                    subscription_url: subscription.url.clone(),
                    download_url: failure.download_url.clone(),
                    error: failure.status,
                    channel: failure.channel,
                    response_status: failure.response_status,
                });
            }
        }

        self.store.save(&subscription).await?;
        debug!(errors = subscription.errors, status = %failure.status, "download failure recorded");
        self.notifier
            .publish(SubscriptionEvent::DownloadFailed, &subscription);
        Ok(request)
    }

    /// Queries the fallback service and turns its advice into a redirect URL.
    async fn consult_fallback(&self, request: &FallbackRequest) -> Option<String> {
        let response = tokio::select! {
            response = self.fallback.consult(request) => response,
            () = self.shutdown.wait() => {
                debug!("shutting down, fallback request abandoned");
                return None;
            }
        };
        let directive = match response {
            Ok(directive) => directive?,
            Err(error) => {
                debug!(error = %error, "fallback request failed");
                return None;
            }
        };

        if self.shutdown.is_done() {
            debug!("shutting down, ignoring fallback answer");
            return None;
        }

        let _guard = self.handler_lock.lock().await;
        let subscription = match self.store.lookup(&request.subscription_url).await {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!(error = %error, "failed to load subscription for fallback answer");
                return None;
            }
        };
        if !subscription.listed {
            debug!("subscription no longer listed, ignoring fallback answer");
            return None;
        }

        let redirect_url = directive.redirect_url(&subscription.filters);
        info!(directive = ?directive, "fallback service redirected subscription");
        Some(redirect_url)
    }
}

/// Returns true if `subscription` was downloaded at or after `check_started` (ms).
///
/// `last_download` has second precision, so downloads up to a second before
/// the check also count.
fn downloaded_since(subscription: &Subscription, check_started: u64) -> bool {
    subscription.last_download > 0
        && secs_to_millis(subscription.last_download) + MILLIS_IN_SECOND > check_started
}

/// A homepage is kept only if it is an absolute `http(s)` URL.
fn is_valid_homepage(homepage: &str) -> bool {
    Url::parse(homepage).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

#[async_trait]
impl DownloadHandler for Synchronizer {
    async fn due_downloadables(&self) -> Vec<Downloadable> {
        if !self.config.auto_update {
            return Vec::new();
        }

        match self.store.listed().await {
            Ok(subscriptions) => subscriptions
                .iter()
                .filter(|subscription| subscription.is_downloadable())
                .map(|subscription| to_downloadable(subscription, false))
                .collect(),
            Err(error) => {
                warn!(error = %error, "failed to list subscriptions");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self, downloadable), fields(url = %downloadable.url))]
    async fn on_expiration_change(&self, downloadable: &Downloadable) {
        let _guard = self.handler_lock.lock().await;
        let result = async {
            let mut subscription = self.store.lookup(&downloadable.url).await?;
            let update = ScheduleUpdate::from_downloadable(downloadable);
            if downloaded_since(&subscription, downloadable.last_check) {
                // The expirations in `downloadable` predate that download.
                debug!("downloaded since the check began, keeping its schedule");
                subscription.last_check = update.last_check;
            } else {
                update.apply_to(&mut subscription);
            }
            self.store.save(&subscription).await
        }
        .await;

        if let Err(error) = result {
            warn!(error = %error, "failed to save schedule");
        }
    }

    async fn on_download_started(&self, downloadable: &Downloadable) {
        let _guard = self.handler_lock.lock().await;
        match self.store.lookup(&downloadable.url).await {
            Ok(subscription) => self
                .notifier
                .publish(SubscriptionEvent::Downloading, &subscription),
            Err(error) => warn!(url = %downloadable.url, error = %error, "failed to load subscription"),
        }
    }

    #[instrument(skip(self, downloadable, body), fields(url = %downloadable.url))]
    async fn on_download_success(&self, downloadable: &Downloadable, body: &str) -> SuccessOutcome {
        let parsed = match self.parser.parse(body) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(error = %error, "downloaded list rejected");
                return SuccessOutcome::Invalid(error.status());
            }
        };

        if let Some(redirect) = parsed.redirect() {
            debug!(redirect, "list declares a new location");
            return SuccessOutcome::Redirect(redirect.to_string());
        }

        let _guard = self.handler_lock.lock().await;
        match self.apply_list(downloadable, parsed).await {
            Ok(subscription) => {
                info!(
                    filters = subscription.filters.len(),
                    soft_expiration = subscription.soft_expiration,
                    hard_expiration = subscription.hard_expiration,
                    "subscription updated"
                );
                self.notifier
                    .publish(SubscriptionEvent::Updated, &subscription);
            }
            Err(error) => warn!(error = %error, "failed to save downloaded list"),
        }
        SuccessOutcome::Applied
    }

    #[instrument(
        skip(self, downloadable, failure),
        fields(url = %downloadable.url, manual = downloadable.manual)
    )]
    async fn on_download_error(
        &self,
        downloadable: &Downloadable,
        failure: &DownloadFailure,
        redirect_allowed: bool,
    ) -> Option<String> {
        let request = {
            let _guard = self.handler_lock.lock().await;
            match self
                .record_failure(downloadable, failure, redirect_allowed)
                .await
            {
                Ok(request) => request,
                Err(error) => {
                    warn!(error = %error, "failed to record download failure");
                    return None;
                }
            }
        }?;

        self.consult_fallback(&request).await
    }
}
