//! `SQLite`-backed subscription store.
//!
//! Each subscription is one row of the `subscriptions` table. The active set
//! is expressed by a non-null `position`; `replace` swaps positions inside a
//! transaction so a concurrent `listed` never observes both or neither entry.

use async_trait::async_trait;
use sqlx::{FromRow, Sqlite};
use tracing::{debug, instrument, warn};

use super::{DownloadStatus, StoreError, Subscription, SubscriptionKind, SubscriptionStore};
use crate::db::Database;

/// Row shape of the `subscriptions` table.
#[derive(Debug, FromRow)]
struct SubscriptionRow {
    url: String,
    kind: String,
    title: String,
    fixed_title: bool,
    disabled: bool,
    homepage: Option<String>,
    last_check: i64,
    last_download: i64,
    last_success: i64,
    soft_expiration: i64,
    hard_expiration: i64,
    download_status: Option<String>,
    errors: i64,
    download_count: i64,
    version: i64,
    required_version: Option<String>,
    filters: String,
    position: Option<i64>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription, StoreError> {
        let kind = match self.kind.as_str() {
            "user_defined" => SubscriptionKind::UserDefined,
            "downloadable" => SubscriptionKind::Downloadable,
            other => return Err(StoreError::corrupt(&self.url, format!("unknown kind {other}"))),
        };

        // An unreadable status only loses the last outcome; keep the record usable.
        let download_status = self.download_status.as_deref().and_then(|raw| {
            raw.parse::<DownloadStatus>()
                .inspect_err(|e| warn!(url = %self.url, error = %e, "ignoring stored download status"))
                .ok()
        });

        let filters: Vec<String> = serde_json::from_str(&self.filters)
            .map_err(|e| StoreError::corrupt(&self.url, format!("filters: {e}")))?;

        Ok(Subscription {
            kind,
            title: self.title,
            fixed_title: self.fixed_title,
            disabled: self.disabled,
            homepage: self.homepage,
            last_check: from_db(self.last_check),
            last_download: from_db(self.last_download),
            last_success: from_db(self.last_success),
            soft_expiration: from_db(self.soft_expiration),
            hard_expiration: from_db(self.hard_expiration),
            download_status,
            errors: u32::try_from(self.errors).unwrap_or(0),
            download_count: u32::try_from(self.download_count).unwrap_or(0),
            version: from_db(self.version),
            required_version: self.required_version,
            filters,
            listed: self.position.is_some(),
            url: self.url,
        })
    }
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Subscription store persisted in `SQLite`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Creates a store on top of an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

async fn upsert<'e, E>(executor: E, subscription: &Subscription) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let filters = serde_json::to_string(&subscription.filters)
        .map_err(|e| StoreError::corrupt(&subscription.url, format!("filters: {e}")))?;

    sqlx::query(
        r"INSERT INTO subscriptions (
            url, kind, title, fixed_title, disabled, homepage,
            last_check, last_download, last_success, soft_expiration, hard_expiration,
            download_status, errors, download_count, version, required_version, filters
          )
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
          ON CONFLICT(url) DO UPDATE SET
            kind = excluded.kind,
            title = excluded.title,
            fixed_title = excluded.fixed_title,
            disabled = excluded.disabled,
            homepage = excluded.homepage,
            last_check = excluded.last_check,
            last_download = excluded.last_download,
            last_success = excluded.last_success,
            soft_expiration = excluded.soft_expiration,
            hard_expiration = excluded.hard_expiration,
            download_status = excluded.download_status,
            errors = excluded.errors,
            download_count = excluded.download_count,
            version = excluded.version,
            required_version = excluded.required_version,
            filters = excluded.filters",
    )
    .bind(&subscription.url)
    .bind(subscription.kind.as_str())
    .bind(&subscription.title)
    .bind(subscription.fixed_title)
    .bind(subscription.disabled)
    .bind(subscription.homepage.as_deref())
    .bind(to_db(subscription.last_check))
    .bind(to_db(subscription.last_download))
    .bind(to_db(subscription.last_success))
    .bind(to_db(subscription.soft_expiration))
    .bind(to_db(subscription.hard_expiration))
    .bind(subscription.download_status.map(|status| status.as_str()))
    .bind(i64::from(subscription.errors))
    .bind(i64::from(subscription.download_count))
    .bind(to_db(subscription.version))
    .bind(subscription.required_version.as_deref())
    .bind(filters)
    .execute(executor)
    .await?;

    Ok(())
}

const NEXT_POSITION: &str =
    "(SELECT COALESCE(MAX(position), -1) + 1 FROM subscriptions WHERE position IS NOT NULL)";

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn lookup(&self, url: &str) -> Result<Subscription, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO subscriptions (url, kind, title) VALUES (?, ?, ?)")
            .bind(url)
            .bind(SubscriptionKind::for_url(url).as_str())
            .bind(url)
            .execute(self.db.pool())
            .await?;

        let row = sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions WHERE url = ?")
            .bind(url)
            .fetch_one(self.db.pool())
            .await?;
        row.into_subscription()
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError> {
        upsert(self.db.pool(), subscription).await
    }

    #[instrument(skip(self, subscription), fields(url = %subscription.url))]
    async fn add(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;
        upsert(&mut *tx, subscription).await?;
        let result = sqlx::query(&format!(
            "UPDATE subscriptions SET position = {NEXT_POSITION} WHERE url = ? AND position IS NULL"
        ))
        .bind(&subscription.url)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if result.rows_affected() > 0 {
            debug!("subscription added to active set");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, url: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscriptions SET position = NULL WHERE url = ?")
            .bind(url)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self, subscription), fields(new_url = %subscription.url))]
    async fn replace(&self, old_url: &str, subscription: &Subscription) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;

        let old_position: Option<i64> =
            sqlx::query_scalar("SELECT position FROM subscriptions WHERE url = ?")
                .bind(old_url)
                .fetch_optional(&mut *tx)
                .await?
                .flatten();

        sqlx::query("UPDATE subscriptions SET position = NULL WHERE url IN (?, ?)")
            .bind(old_url)
            .bind(&subscription.url)
            .execute(&mut *tx)
            .await?;

        upsert(&mut *tx, subscription).await?;

        match old_position {
            Some(position) => {
                sqlx::query("UPDATE subscriptions SET position = ? WHERE url = ?")
                    .bind(position)
                    .bind(&subscription.url)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query(&format!(
                    "UPDATE subscriptions SET position = {NEXT_POSITION} WHERE url = ?"
                ))
                .bind(&subscription.url)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!("subscription replaced in active set");
        Ok(())
    }

    async fn listed(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE position IS NOT NULL ORDER BY position ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect()
    }
}
