//! Shared runtime state built once the config and database are open.

use std::sync::Arc;

use anyhow::{Context, Result};
use listsync_core::{
    BroadcastNotifier, Database, HttpDownloader, Shutdown, SqliteStore, SyncConfig, Synchronizer,
};

/// Everything the `update` and `run` commands need, wired together.
pub struct SyncContext {
    pub(crate) store: Arc<SqliteStore>,
    pub(crate) downloader: Arc<HttpDownloader>,
    pub(crate) notifier: BroadcastNotifier,
    pub(crate) synchronizer: Arc<Synchronizer>,
    pub(crate) shutdown: Arc<Shutdown>,
}

impl SyncContext {
    /// Builds the downloader and synchronizer around `db` and registers them.
    pub fn start(config: SyncConfig, db: Database) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(db));
        let downloader = Arc::new(
            HttpDownloader::from_config(&config).context("failed to build HTTP downloader")?,
        );
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
            .context("failed to build fallback HTTP client")?,
        );
        synchronizer.initialize();

        Ok(Self {
            store,
            downloader,
            notifier,
            synchronizer,
            shutdown,
        })
    }

    /// Runs the shutdown hooks and waits for in-flight downloads to stop.
    pub async fn stop(&self) {
        self.shutdown.trigger();
        self.downloader.wait_idle().await;
    }
}
