//! Integration tests for the synchronizer driving a real HTTP downloader.
//!
//! These tests verify the full refresh flow against mock list and fallback servers.

use std::sync::Arc;
use std::time::Duration;

use listsync_core::config::{ClientInfo, SyncConfig};
use listsync_core::download::{HttpClient, HttpDownloader, Schedule};
use listsync_core::expiration::ExpirationPolicy;
use listsync_core::notify::{BroadcastNotifier, SubscriptionEvent};
use listsync_core::shutdown::Shutdown;
use listsync_core::subscription::{DownloadStatus, MemoryStore, Subscription, SubscriptionStore};
use listsync_core::sync::Synchronizer;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST: &str = "[Adblock Plus 2.0]\n! Title: Mock list\n! Expires: 1 days\n||ads.example^\n";

struct Setup {
    store: Arc<MemoryStore>,
    downloader: Arc<HttpDownloader>,
    notifier: BroadcastNotifier,
    synchronizer: Arc<Synchronizer>,
    shutdown: Arc<Shutdown>,
}

/// Wires a synchronizer to an HTTP downloader whose scheduler starts after `initial_delay`.
fn setup(config: SyncConfig, initial_delay: Duration) -> Setup {
    let store = Arc::new(MemoryStore::new());
    let schedule = Schedule {
        initial_delay,
        check_interval: Duration::from_secs(3600),
        policy: ExpirationPolicy::default(),
    };
    let downloader = Arc::new(HttpDownloader::new(
        HttpClient::new().expect("client should build"),
        ClientInfo::default(),
        schedule,
    ));
    let notifier = BroadcastNotifier::default();
    let shutdown = Arc::new(Shutdown::new());
    let synchronizer = Arc::new(
        Synchronizer::new(
            store.clone(),
            downloader.clone(),
            Arc::new(notifier.clone()),
            config,
            Arc::clone(&shutdown),
        )
        .expect("synchronizer should build"),
    );
    synchronizer.initialize();

    Setup {
        store,
        downloader,
        notifier,
        synchronizer,
        shutdown,
    }
}

async fn subscribe(store: &MemoryStore, url: &str) -> Subscription {
    store
        .add(&Subscription::new(url))
        .await
        .expect("add should succeed");
    store.lookup(url).await.expect("lookup should succeed")
}

async fn listed_urls(store: &MemoryStore) -> Vec<String> {
    store
        .listed()
        .await
        .expect("listed should succeed")
        .into_iter()
        .map(|subscription| subscription.url)
        .collect()
}

#[tokio::test]
async fn test_manual_update_applies_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .and(query_param("addonName", "listsync"))
        .and(query_param("lastVersion", "0"))
        .and(query_param("downloadCount", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LIST))
        .expect(1)
        .mount(&server)
        .await;
    let s = setup(SyncConfig::default(), Duration::from_secs(3600));
    let url = format!("{}/list.txt", server.uri());
    let subscription = subscribe(&s.store, &url).await;
    let mut events = s.notifier.subscribe();

    assert!(s.synchronizer.trigger_download(&subscription, true));
    assert!(s.synchronizer.is_in_progress(&url));
    s.downloader.wait_idle().await;

    assert!(!s.synchronizer.is_in_progress(&url));
    let stored = s.store.lookup(&url).await.unwrap();
    assert_eq!(stored.download_status, Some(DownloadStatus::Ok));
    assert_eq!(stored.title, "Mock list");
    assert!(stored.fixed_title);
    assert_eq!(stored.filters, ["||ads.example^"]);
    assert_eq!(stored.download_count, 1);
    assert_eq!(stored.errors, 0);
    assert!(stored.soft_expiration <= stored.hard_expiration);

    assert_eq!(
        events.recv().await.unwrap().event,
        SubscriptionEvent::Downloading
    );
    assert_eq!(events.recv().await.unwrap().event, SubscriptionEvent::Updated);
}

#[tokio::test]
async fn test_second_submission_while_in_flight_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(LIST)
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let s = setup(SyncConfig::default(), Duration::from_secs(3600));
    let subscription = subscribe(&s.store, &format!("{}/list.txt", server.uri())).await;

    assert!(s.synchronizer.trigger_download(&subscription, true));
    assert!(!s.synchronizer.trigger_download(&subscription, true));
    s.downloader.wait_idle().await;
}

#[tokio::test]
async fn test_scheduler_downloads_due_subscriptions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LIST))
        .mount(&server)
        .await;
    let s = setup(SyncConfig::default(), Duration::from_millis(100));
    let mut events = s.notifier.subscribe();
    let url = format!("{}/list.txt", server.uri());
    subscribe(&s.store, &url).await;

    let updated = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if events.recv().await.unwrap().event == SubscriptionEvent::Updated {
                break;
            }
        }
    })
    .await;
    assert!(updated.is_ok(), "scheduler should refresh the due subscription");

    s.downloader.wait_idle().await;
    let stored = s.store.lookup(&url).await.unwrap();
    assert_eq!(stored.download_status, Some(DownloadStatus::Ok));
    assert!(stored.last_check > 0);
    s.shutdown.trigger();
}

#[tokio::test]
async fn test_list_redirect_moves_subscription() {
    let server = MockServer::start().await;
    let new_url = format!("{}/new.txt", server.uri());
    Mock::given(method("GET"))
        .and(path("/old.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("[Adblock]\n! Redirect: {new_url}\n")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[Adblock]\n||moved.example^\n"))
        .expect(1)
        .mount(&server)
        .await;
    let s = setup(SyncConfig::default(), Duration::from_secs(3600));
    let old_url = format!("{}/old.txt", server.uri());
    let mut subscription = subscribe(&s.store, &old_url).await;
    subscription.title = "Renamed by user".to_string();
    s.store.save(&subscription).await.unwrap();

    s.synchronizer.trigger_download(&subscription, true);
    s.downloader.wait_idle().await;

    assert_eq!(listed_urls(&s.store).await, [new_url.clone()]);
    let moved = s.store.lookup(&new_url).await.unwrap();
    assert_eq!(moved.title, "Renamed by user");
    assert_eq!(moved.filters, ["||moved.example^"]);
    assert!(!s.store.lookup(&old_url).await.unwrap().listed);
}

#[tokio::test]
async fn test_server_error_is_recorded_without_fallback_below_threshold() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fallback"))
        .respond_with(ResponseTemplate::new(200).set_body_string("410"))
        .expect(0)
        .mount(&server)
        .await;
    let config = SyncConfig {
        fallback_error_threshold: 2,
        fallback_url_template: format!("{}/fallback?url=%SUBSCRIPTION%", server.uri()),
        ..SyncConfig::default()
    };
    let s = setup(config, Duration::from_secs(3600));
    let url = format!("{}/list.txt", server.uri());
    let subscription = subscribe(&s.store, &url).await;

    s.synchronizer.trigger_download(&subscription, false);
    s.downloader.wait_idle().await;

    let stored = s.store.lookup(&url).await.unwrap();
    assert_eq!(stored.errors, 1);
    assert_eq!(stored.download_status, Some(DownloadStatus::ConnectionError));
    assert!(stored.last_download > 0);
    assert_eq!(stored.last_success, 0);
}

#[tokio::test]
async fn test_fallback_moved_redirects_to_new_location() {
    let server = MockServer::start().await;
    let new_url = format!("{}/mirror.txt", server.uri());
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fallback"))
        .and(query_param("error", "synchronize_connection_error"))
        .and(query_param("responseStatus", "404"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("301 {new_url}")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mirror.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LIST))
        .expect(1)
        .mount(&server)
        .await;
    let config = SyncConfig {
        fallback_error_threshold: 1,
        fallback_url_template: format!(
            "{}/fallback?error=%ERROR%&responseStatus=%RESPONSESTATUS%",
            server.uri()
        ),
        ..SyncConfig::default()
    };
    let s = setup(config, Duration::from_secs(3600));
    let url = format!("{}/list.txt", server.uri());
    let subscription = subscribe(&s.store, &url).await;

    s.synchronizer.trigger_download(&subscription, false);
    s.downloader.wait_idle().await;

    assert_eq!(listed_urls(&s.store).await, [new_url.clone()]);
    let moved = s.store.lookup(&new_url).await.unwrap();
    assert_eq!(moved.download_status, Some(DownloadStatus::Ok));
    assert_eq!(moved.errors, 0);
    assert_eq!(s.store.lookup(&url).await.unwrap().errors, 0);
}

#[tokio::test]
async fn test_fallback_gone_retires_subscription_with_its_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fallback"))
        .respond_with(ResponseTemplate::new(200).set_body_string("410\n"))
        .expect(1)
        .mount(&server)
        .await;
    let config = SyncConfig {
        fallback_error_threshold: 1,
        fallback_url_template: format!("{}/fallback?url=%SUBSCRIPTION%", server.uri()),
        ..SyncConfig::default()
    };
    let s = setup(config, Duration::from_secs(3600));
    let url = format!("{}/list.txt", server.uri());
    let mut subscription = subscribe(&s.store, &url).await;
    subscription.filters = vec!["||kept.example^".to_string(), "##.ad".to_string()];
    s.store.save(&subscription).await.unwrap();

    s.synchronizer.trigger_download(&subscription, false);
    s.downloader.wait_idle().await;

    let listed = s.store.listed().await.unwrap();
    assert_eq!(listed.len(), 1);
    let retired = &listed[0];
    assert!(retired.url.starts_with("data:text/plain,"));
    assert_eq!(retired.filters, ["||kept.example^", "##.ad"]);
    assert_eq!(retired.download_status, Some(DownloadStatus::Ok));
    assert!(!s.store.lookup(&url).await.unwrap().listed);
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_slow_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fallback"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("410")
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;
    let config = SyncConfig {
        fallback_error_threshold: 1,
        fallback_url_template: format!("{}/fallback?url=%SUBSCRIPTION%", server.uri()),
        ..SyncConfig::default()
    };
    let s = setup(config, Duration::from_secs(3600));
    let url = format!("{}/list.txt", server.uri());
    let subscription = subscribe(&s.store, &url).await;

    assert!(s.synchronizer.trigger_download(&subscription, false));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(s.synchronizer.is_in_progress(&url));

    s.shutdown.trigger();
    let stopped = tokio::time::timeout(Duration::from_secs(1), s.downloader.wait_idle()).await;

    assert!(stopped.is_ok(), "shutdown should abandon the fallback request");
    assert_eq!(listed_urls(&s.store).await, [url]);
}

#[tokio::test]
async fn test_cancel_stops_new_downloads() {
    let s = setup(SyncConfig::default(), Duration::from_secs(3600));
    let subscription = subscribe(&s.store, "https://example.invalid/list.txt").await;

    s.shutdown.trigger();

    assert!(!s.synchronizer.trigger_download(&subscription, true));
    assert!(!s.synchronizer.is_in_progress(&subscription.url));
}
