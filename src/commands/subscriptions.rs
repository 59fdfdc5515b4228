//! Subscription management commands: add, remove, list.

use anyhow::{Result, bail};
use listsync_core::{Database, SqliteStore, Subscription, SubscriptionStore};
use tracing::info;

pub async fn run_add_command(db: Database, url: &str, title: Option<&str>) -> Result<()> {
    let store = SqliteStore::new(db);
    let mut subscription = store.lookup(url).await?;
    if subscription.listed {
        println!("already subscribed: {url}");
        return Ok(());
    }

    if let Some(title) = title {
        subscription.title = title.to_string();
    }
    store.add(&subscription).await?;
    info!(url, "subscription added");
    println!("added {url}");
    Ok(())
}

pub async fn run_remove_command(db: Database, url: &str) -> Result<()> {
    let store = SqliteStore::new(db);
    let subscription = store.lookup(url).await?;
    if !subscription.listed {
        bail!("not subscribed: {url}");
    }

    store.remove(url).await?;
    info!(url, "subscription removed");
    println!("removed {url}");
    Ok(())
}

pub async fn run_list_command(db: Database) -> Result<()> {
    let store = SqliteStore::new(db);
    let subscriptions = store.listed().await?;
    if subscriptions.is_empty() {
        println!("No subscriptions.");
        return Ok(());
    }

    for subscription in &subscriptions {
        println!("{}", render_subscription_row(subscription));
    }
    Ok(())
}

/// One line per subscription: status, URL, then the schedule as `key=value` pairs.
pub(crate) fn render_subscription_row(subscription: &Subscription) -> String {
    let status = subscription
        .download_status
        .map_or("never_downloaded", |status| status.as_str());
    let mut row = format!(
        "{status}  {}  title={:?} errors={} last_success={} soft_expiration={} hard_expiration={}",
        subscription.url,
        subscription.title,
        subscription.errors,
        subscription.last_success,
        subscription.soft_expiration,
        subscription.hard_expiration,
    );
    if subscription.disabled {
        row.push_str(" disabled");
    }
    row
}
