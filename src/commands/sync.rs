//! Synchronization commands: one-shot update and the long-running scheduler.

use anyhow::{Result, bail};
use listsync_core::{Database, SubscriptionStore, SyncConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::context::SyncContext;
use super::subscriptions::render_subscription_row;

/// Downloads one or every listed subscription manually and waits for the results.
pub async fn run_update_command(config: SyncConfig, db: Database, url: Option<&str>) -> Result<()> {
    let ctx = SyncContext::start(config, db)?;

    let targets = match url {
        Some(url) => {
            let subscription = ctx.store.lookup(url).await?;
            if !subscription.listed {
                ctx.stop().await;
                bail!("not subscribed: {url}");
            }
            vec![subscription]
        }
        None => ctx.store.listed().await?,
    };

    let mut urls = Vec::new();
    for subscription in targets.iter().filter(|s| s.is_downloadable()) {
        if ctx.synchronizer.trigger_download(subscription, true) {
            urls.push(subscription.url.clone());
        }
    }
    info!(count = urls.len(), "downloads started");

    ctx.downloader.wait_idle().await;
    ctx.stop().await;

    for url in &urls {
        let subscription = ctx.store.lookup(url).await?;
        println!("{}", render_subscription_row(&subscription));
    }
    Ok(())
}

/// Runs the refresh scheduler until Ctrl-C.
pub async fn run_scheduler_command(config: SyncConfig, db: Database) -> Result<()> {
    let ctx = SyncContext::start(config, db)?;

    let mut events = ctx.notifier.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(notification) => info!(
                    event = %notification.event,
                    url = %notification.url,
                    status = ?notification.download_status,
                    "subscription event"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("scheduler running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    ctx.stop().await;
    event_log.abort();
    Ok(())
}
