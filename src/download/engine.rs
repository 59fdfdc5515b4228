//! Refresh scheduler and download runner.
//!
//! [`HttpDownloader`] owns a timer task that asks its [`DownloadHandler`] for
//! candidates, applies the [`ExpirationPolicy`] and spawns one task per due
//! download. Each download task runs the whole redirect chain for its URL, so
//! the URL stays in flight until the chain ends.
//!
//! # Concurrency Model
//!
//! - Each download runs in its own Tokio task; different URLs may overlap
//! - In-flight URLs live in a `DashSet`; insertion is the admission check
//! - Cancellation flips a `watch` flag observed at every network await
//! - The handler is held through a `Weak` reference to avoid a cycle with
//!   the synchronizer that owns this downloader

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::client::has_data_scheme;
use super::constants::{CHECK_INTERVAL, DOWNLOAD_COUNT_CAP, INITIAL_DELAY, MAX_REDIRECTS};
use super::{
    ChannelStatus, DownloadError, DownloadFailure, DownloadHandler, Downloadable, Downloader,
    HttpClient, SuccessOutcome,
};
use crate::config::{ClientInfo, SyncConfig};
use crate::expiration::{ExpirationPolicy, ExpirationWindow, now_millis};
use crate::subscription::DownloadStatus;

/// Shortest accepted check interval; `tokio::time::interval` rejects zero.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Timing and expiration rules of an [`HttpDownloader`].
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Delay before the first check.
    pub initial_delay: Duration,
    /// Interval between checks.
    pub check_interval: Duration,
    /// Expiration and backoff rules.
    pub policy: ExpirationPolicy,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            check_interval: CHECK_INTERVAL,
            policy: ExpirationPolicy::default(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    client: HttpClient,
    client_info: ClientInfo,
    schedule: Schedule,
    handler: RwLock<Option<Weak<dyn DownloadHandler>>>,
    in_flight: DashSet<String>,
    idle: Notify,
    cancel_tx: watch::Sender<bool>,
}

/// HTTP-backed [`Downloader`] with a periodic refresh scheduler.
///
/// Must be used from within a Tokio runtime: [`start`](Downloader::start) and
/// [`download`](Downloader::download) spawn tasks.
#[derive(Debug)]
pub struct HttpDownloader {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl HttpDownloader {
    /// Creates a downloader around an existing client.
    #[must_use]
    pub fn new(client: HttpClient, client_info: ClientInfo, schedule: Schedule) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                client,
                client_info,
                schedule,
                handler: RwLock::new(None),
                in_flight: DashSet::new(),
                idle: Notify::new(),
                cancel_tx,
            }),
            timer: Mutex::new(None),
        }
    }

    /// Creates a downloader from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> Result<Self, DownloadError> {
        let client = HttpClient::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)?;
        let schedule = Schedule {
            initial_delay: config.initial_delay(),
            check_interval: config.check_interval(),
            policy: ExpirationPolicy::default(),
        };
        Ok(Self::new(client, config.client.clone(), schedule))
    }

    /// Waits until no download is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl Downloader for HttpDownloader {
    fn start(&self, handler: Weak<dyn DownloadHandler>) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_scheduler().await });
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(
            initial_delay_secs = self.inner.schedule.initial_delay.as_secs(),
            check_interval_secs = self.inner.schedule.check_interval.as_secs(),
            "downloader started"
        );
    }

    fn download(&self, downloadable: Downloadable) -> bool {
        self.inner.submit(downloadable)
    }

    fn is_downloading(&self, url: &str) -> bool {
        self.inner.in_flight.contains(url)
    }

    fn cancel(&self) {
        self.inner.cancel_tx.send_replace(true);
        if let Some(task) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        info!("downloader cancelled");
    }

    fn process_expiration_interval(&self, interval: Duration) -> ExpirationWindow {
        self.inner
            .schedule
            .policy
            .process_interval(interval, now_millis())
    }
}

impl Inner {
    fn handler(&self) -> Option<Arc<dyn DownloadHandler>> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    async fn run_scheduler(self: Arc<Self>) {
        let mut cancel = self.cancel_tx.subscribe();
        tokio::select! {
            () = wait_cancelled(&mut cancel) => return,
            () = tokio::time::sleep(self.schedule.initial_delay) => {}
        }

        let mut ticker =
            tokio::time::interval(self.schedule.check_interval.max(MIN_CHECK_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = wait_cancelled(&mut cancel) => break,
                _ = ticker.tick() => self.do_check().await,
            }
        }
        debug!("scheduler stopped");
    }

    /// One scheduler tick: adjust every candidate's schedule, then download the due ones.
    #[instrument(skip(self))]
    async fn do_check(self: &Arc<Self>) {
        let Some(handler) = self.handler() else {
            debug!("no handler registered, skipping check");
            return;
        };

        let now = now_millis();
        let candidates = handler.due_downloadables().await;
        debug!(count = candidates.len(), "checking subscriptions");

        for mut downloadable in candidates {
            // Its own download will write a fresher schedule than this snapshot.
            if self.in_flight.contains(&downloadable.url) {
                debug!(url = %downloadable.url, "download in progress, skipping check");
                continue;
            }
            self.schedule.policy.refresh_check(&mut downloadable, now);
            handler.on_expiration_change(&downloadable).await;

            if self.schedule.policy.is_due(&downloadable, now) {
                self.submit(downloadable);
            }
        }
    }

    fn submit(self: &Arc<Self>, downloadable: Downloadable) -> bool {
        if self.is_cancelled() {
            debug!(url = %downloadable.url, "downloader cancelled, ignoring download");
            return false;
        }
        if !self.in_flight.insert(downloadable.url.clone()) {
            debug!(url = %downloadable.url, "download already in progress");
            return false;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let url = downloadable.url.clone();
            inner.run_download(downloadable).await;
            inner.in_flight.remove(&url);
            if inner.in_flight.is_empty() {
                inner.idle.notify_waiters();
            }
        });
        true
    }

    async fn run_download(&self, mut downloadable: Downloadable) {
        let mut redirects = 0;
        loop {
            let Some(handler) = self.handler() else {
                debug!(url = %downloadable.url, "handler gone, dropping download");
                return;
            };
            let Some(next_url) = self
                .attempt(handler.as_ref(), &mut downloadable, redirects)
                .await
            else {
                return;
            };
            if self.is_cancelled() {
                return;
            }

            redirects += 1;
            debug!(url = %downloadable.url, redirect_url = %next_url, redirects, "following redirect");
            downloadable.redirect_url = Some(next_url);
        }
    }

    /// Runs one request and its handler callback. Returns the next URL to fetch, if any.
    #[instrument(skip(self, handler, downloadable), fields(url = %downloadable.url))]
    async fn attempt(
        &self,
        handler: &dyn DownloadHandler,
        downloadable: &mut Downloadable,
        redirects: u32,
    ) -> Option<String> {
        let download_url = build_download_url(downloadable, &self.client_info);
        handler.on_download_started(downloadable).await;

        let mut cancel = self.cancel_tx.subscribe();
        let result = tokio::select! {
            result = self.client.fetch_text(&download_url) => result,
            () = wait_cancelled(&mut cancel) => {
                debug!("download cancelled");
                return None;
            }
        };

        let body = match result {
            Ok(body) => body,
            Err(error) => {
                warn!(error = %error, "download failed");
                let failure = error.to_failure(download_url);
                return self
                    .report_error(handler, downloadable, &failure, redirects)
                    .await;
            }
        };

        downloadable.download_count = downloadable.download_count.saturating_add(1);
        info!(bytes = body.len(), "download complete");

        match handler.on_download_success(downloadable, &body).await {
            SuccessOutcome::Applied => None,
            SuccessOutcome::Invalid(status) => {
                let failure = DownloadFailure {
                    status,
                    download_url,
                    channel: ChannelStatus::Ok,
                    response_status: 200,
                };
                self.report_error(handler, downloadable, &failure, redirects)
                    .await
            }
            SuccessOutcome::Redirect(url) if redirects < MAX_REDIRECTS => Some(url),
            SuccessOutcome::Redirect(url) => {
                warn!(redirect_url = %url, "too many redirects");
                let failure = DownloadFailure {
                    status: DownloadStatus::ConnectionError,
                    download_url,
                    channel: ChannelStatus::Redirect,
                    response_status: 200,
                };
                self.report_error(handler, downloadable, &failure, redirects)
                    .await
            }
        }
    }

    async fn report_error(
        &self,
        handler: &dyn DownloadHandler,
        downloadable: &Downloadable,
        failure: &DownloadFailure,
        redirects: u32,
    ) -> Option<String> {
        let redirect_allowed = redirects < MAX_REDIRECTS;
        handler
            .on_download_error(downloadable, failure, redirect_allowed)
            .await
            .filter(|_| redirect_allowed)
    }
}

/// Resolves once the cancel flag is set (or its sender is gone).
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Builds the request URL for a downloadable, appending client identification.
///
/// `data:` URLs are returned unchanged since their payload ends at the URL's end.
#[must_use]
pub fn build_download_url(downloadable: &Downloadable, client_info: &ClientInfo) -> String {
    let url = downloadable.effective_url();
    if has_data_scheme(url) {
        return url.to_string();
    }

    let last_version = downloadable.last_version.to_string();
    let download_count = if downloadable.download_count > DOWNLOAD_COUNT_CAP {
        format!("{DOWNLOAD_COUNT_CAP}+")
    } else {
        downloadable.download_count.to_string()
    };

    let params = [
        ("addonName", client_info.addon_name.as_str()),
        ("addonVersion", client_info.addon_version.as_str()),
        ("application", client_info.application.as_str()),
        ("applicationVersion", client_info.application_version.as_str()),
        ("platform", client_info.platform.as_str()),
        ("platformVersion", client_info.platform_version.as_str()),
        ("lastVersion", last_version.as_str()),
        ("downloadCount", download_count.as_str()),
    ];
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        due: Mutex<Vec<Downloadable>>,
        expiration_changes: Mutex<Vec<Downloadable>>,
        started: Mutex<Vec<String>>,
        successes: Mutex<Vec<(Downloadable, String)>>,
        failures: Mutex<Vec<(DownloadFailure, bool)>>,
        outcomes: Mutex<VecDeque<SuccessOutcome>>,
        error_redirect: Mutex<Option<String>>,
    }

    #[async_trait]
    impl DownloadHandler for RecordingHandler {
        async fn due_downloadables(&self) -> Vec<Downloadable> {
            self.due.lock().unwrap().clone()
        }

        async fn on_expiration_change(&self, downloadable: &Downloadable) {
            self.expiration_changes
                .lock()
                .unwrap()
                .push(downloadable.clone());
        }

        async fn on_download_started(&self, downloadable: &Downloadable) {
            self.started
                .lock()
                .unwrap()
                .push(downloadable.effective_url().to_string());
        }

        async fn on_download_success(
            &self,
            downloadable: &Downloadable,
            body: &str,
        ) -> SuccessOutcome {
            self.successes
                .lock()
                .unwrap()
                .push((downloadable.clone(), body.to_string()));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SuccessOutcome::Applied)
        }

        async fn on_download_error(
            &self,
            _downloadable: &Downloadable,
            failure: &DownloadFailure,
            redirect_allowed: bool,
        ) -> Option<String> {
            self.failures
                .lock()
                .unwrap()
                .push((failure.clone(), redirect_allowed));
            self.error_redirect.lock().unwrap().clone()
        }
    }

    fn downloader() -> HttpDownloader {
        HttpDownloader::new(
            HttpClient::new().unwrap(),
            ClientInfo::default(),
            Schedule::default(),
        )
    }

    fn start(downloader: &HttpDownloader, handler: &Arc<RecordingHandler>) {
        let handler: Arc<dyn DownloadHandler> = handler.clone();
        downloader.start(Arc::downgrade(&handler));
    }

    // ==================== URL Tests ====================

    #[test]
    fn test_build_download_url_appends_client_info() {
        let mut downloadable = Downloadable::new("https://example.com/list.txt");
        downloadable.last_version = 201_601_010_000;
        downloadable.download_count = 3;
        let info = ClientInfo {
            addon_name: "listsync".to_string(),
            addon_version: "1.0".to_string(),
            application: "cli app".to_string(),
            application_version: "2".to_string(),
            platform: "linux".to_string(),
            platform_version: "x86_64".to_string(),
        };

        let url = build_download_url(&downloadable, &info);

        assert_eq!(
            url,
            "https://example.com/list.txt?addonName=listsync&addonVersion=1.0&application=cli%20app\
             &applicationVersion=2&platform=linux&platformVersion=x86_64\
             &lastVersion=201601010000&downloadCount=3"
        );
    }

    #[test]
    fn test_build_download_url_caps_download_count() {
        let mut downloadable = Downloadable::new("https://example.com/list.txt?lang=en");
        downloadable.download_count = 5;

        let url = build_download_url(&downloadable, &ClientInfo::default());

        assert!(url.starts_with("https://example.com/list.txt?lang=en&addonName="), "{url}");
        assert!(url.ends_with("&downloadCount=4%2B"), "{url}");
    }

    #[test]
    fn test_build_download_url_uses_redirect_and_skips_data_urls() {
        let mut downloadable = Downloadable::new("https://example.com/list.txt");
        downloadable.redirect_url = Some("data:text/plain,%5BAdblock%5D".to_string());
        assert_eq!(
            build_download_url(&downloadable, &ClientInfo::default()),
            "data:text/plain,%5BAdblock%5D"
        );
    }

    // ==================== Download Tests ====================

    #[tokio::test]
    async fn test_download_success_increments_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.txt"))
            .and(query_param("addonName", "listsync"))
            .and(query_param("downloadCount", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[Adblock]\n||ads^"))
            .expect(1)
            .mount(&server)
            .await;

        let handler = Arc::new(RecordingHandler::default());
        let downloader = downloader();
        start(&downloader, &handler);

        assert!(downloader.download(Downloadable::new(format!("{}/list.txt", server.uri()))));
        downloader.wait_idle().await;

        let successes = handler.successes.lock().unwrap();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].0.download_count, 1);
        assert_eq!(successes[0].1, "[Adblock]\n||ads^");
        assert!(handler.failures.lock().unwrap().is_empty());
        assert_eq!(handler.started.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_200_reports_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let handler = Arc::new(RecordingHandler::default());
        let downloader = downloader();
        start(&downloader, &handler);

        downloader.download(Downloadable::new(format!("{}/list.txt", server.uri())));
        downloader.wait_idle().await;

        let failures = handler.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        let (failure, redirect_allowed) = &failures[0];
        assert_eq!(failure.status, DownloadStatus::ConnectionError);
        assert_eq!(failure.response_status, 503);
        assert!(failure.download_url.contains("addonName="));
        assert!(*redirect_allowed);
        assert!(handler.successes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_scheme_reports_invalid_url() {
        let handler = Arc::new(RecordingHandler::default());
        let downloader = downloader();
        start(&downloader, &handler);

        downloader.download(Downloadable::new("ftp://example.com/list.txt"));
        downloader.wait_idle().await;

        let failures = handler.failures.lock().unwrap();
        assert_eq!(failures[0].0.status, DownloadStatus::InvalidUrl);
        assert_eq!(failures[0].0.channel, ChannelStatus::InvalidUrl);
    }

    #[tokio::test]
    async fn test_rejected_body_reports_invalid_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let handler = Arc::new(RecordingHandler::default());
        handler
            .outcomes
            .lock()
            .unwrap()
            .push_back(SuccessOutcome::Invalid(DownloadStatus::InvalidData));
        let downloader = downloader();
        start(&downloader, &handler);

        downloader.download(Downloadable::new(format!("{}/list.txt", server.uri())));
        downloader.wait_idle().await;

        let failures = handler.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.status, DownloadStatus::InvalidData);
        assert_eq!(failures[0].0.response_status, 200);
    }

    #[tokio::test]
    async fn test_content_redirect_is_followed() {
        let server = MockServer::start().await;
        for list in ["/old.txt", "/new.txt"] {
            Mock::given(method("GET"))
                .and(path(list))
                .respond_with(ResponseTemplate::new(200).set_body_string("[Adblock]"))
                .expect(1)
                .mount(&server)
                .await;
        }
        let new_url = format!("{}/new.txt", server.uri());

        let handler = Arc::new(RecordingHandler::default());
        handler
            .outcomes
            .lock()
            .unwrap()
            .push_back(SuccessOutcome::Redirect(new_url.clone()));
        let downloader = downloader();
        start(&downloader, &handler);

        let old_url = format!("{}/old.txt", server.uri());
        downloader.download(Downloadable::new(old_url.clone()));
        downloader.wait_idle().await;

        let successes = handler.successes.lock().unwrap();
        assert_eq!(successes.len(), 2);
        let (last, _) = &successes[1];
        assert_eq!(last.url, old_url);
        assert_eq!(last.redirect_url.as_deref(), Some(new_url.as_str()));
        assert_eq!(last.download_count, 2);
    }

    #[tokio::test]
    async fn test_redirect_budget_is_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[Adblock]"))
            .expect(u64::from(MAX_REDIRECTS) + 1)
            .mount(&server)
            .await;
        let url = format!("{}/loop.txt", server.uri());

        let handler = Arc::new(RecordingHandler::default());
        {
            let mut outcomes = handler.outcomes.lock().unwrap();
            for _ in 0..=MAX_REDIRECTS {
                outcomes.push_back(SuccessOutcome::Redirect(url.clone()));
            }
        }
        let downloader = downloader();
        start(&downloader, &handler);

        downloader.download(Downloadable::new(url));
        downloader.wait_idle().await;

        let failures = handler.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.status, DownloadStatus::ConnectionError);
        assert!(!failures[0].1, "redirect must not be allowed once the budget is spent");
    }

    #[tokio::test]
    async fn test_error_handler_redirect_is_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[Adblock]"))
            .expect(1)
            .mount(&server)
            .await;

        let handler = Arc::new(RecordingHandler::default());
        *handler.error_redirect.lock().unwrap() = Some(format!("{}/moved.txt", server.uri()));
        let downloader = downloader();
        start(&downloader, &handler);

        downloader.download(Downloadable::new(format!("{}/broken.txt", server.uri())));
        downloader.wait_idle().await;

        assert_eq!(handler.failures.lock().unwrap().len(), 1);
        assert_eq!(handler.successes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[Adblock]")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let url = format!("{}/slow.txt", server.uri());

        let handler = Arc::new(RecordingHandler::default());
        let downloader = downloader();
        start(&downloader, &handler);

        assert!(downloader.download(Downloadable::new(url.clone())));
        assert!(downloader.is_downloading(&url));
        assert!(!downloader.download(Downloadable::new(url.clone())));

        downloader.wait_idle().await;
        assert!(!downloader.is_downloading(&url));
    }

    #[tokio::test]
    async fn test_cancel_rejects_new_downloads() {
        let handler = Arc::new(RecordingHandler::default());
        let downloader = downloader();
        start(&downloader, &handler);

        downloader.cancel();

        assert!(!downloader.download(Downloadable::new("https://example.com/list.txt")));
        assert!(!downloader.is_downloading("https://example.com/list.txt"));
    }

    // ==================== Scheduler Tests ====================

    #[tokio::test]
    async fn test_check_downloads_only_due_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/due.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[Adblock]"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fresh.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[Adblock]"))
            .expect(0)
            .mount(&server)
            .await;

        let now = now_millis();
        let due = Downloadable::new(format!("{}/due.txt", server.uri()));
        let mut fresh = Downloadable::new(format!("{}/fresh.txt", server.uri()));
        fresh.last_check = now;
        fresh.soft_expiration = now + 60 * 60 * 1000;
        fresh.hard_expiration = now + 2 * 60 * 60 * 1000;

        let handler = Arc::new(RecordingHandler::default());
        *handler.due.lock().unwrap() = vec![due, fresh];
        let downloader = downloader();
        start(&downloader, &handler);

        downloader.inner.do_check().await;
        downloader.wait_idle().await;

        let changes = handler.expiration_changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|d| d.last_check >= now));
        assert!(changes.iter().all(|d| d.soft_expiration <= d.hard_expiration));
        assert_eq!(handler.successes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_skips_downloads_in_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[Adblock]")
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let url = format!("{}/slow.txt", server.uri());

        let handler = Arc::new(RecordingHandler::default());
        *handler.due.lock().unwrap() = vec![Downloadable::new(url.clone())];
        let downloader = downloader();
        start(&downloader, &handler);

        assert!(downloader.download(Downloadable::new(url)));
        downloader.inner.do_check().await;
        downloader.wait_idle().await;

        assert!(handler.expiration_changes.lock().unwrap().is_empty());
        assert_eq!(handler.successes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_runs_after_initial_delay() {
        let handler = Arc::new(RecordingHandler::default());
        let downloader = HttpDownloader::new(
            HttpClient::new().unwrap(),
            ClientInfo::default(),
            Schedule {
                initial_delay: Duration::from_millis(10),
                check_interval: Duration::from_secs(3600),
                policy: ExpirationPolicy::default(),
            },
        );
        *handler.due.lock().unwrap() = vec![Downloadable::new("ftp://example.com/list.txt")];
        start(&downloader, &handler);

        tokio::time::sleep(Duration::from_millis(200)).await;
        downloader.wait_idle().await;
        downloader.cancel();

        assert_eq!(handler.expiration_changes.lock().unwrap().len(), 1);
        assert_eq!(handler.failures.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_process_expiration_interval_orders_window() {
        let downloader = downloader();
        let window = downloader.process_expiration_interval(Duration::from_secs(86_400));
        assert!(window.soft < window.hard);
    }
}
