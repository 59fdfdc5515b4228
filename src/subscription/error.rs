//! Error types for subscription stores.

use thiserror::Error;

use crate::db::DbError;

/// Errors returned by [`SubscriptionStore`](super::SubscriptionStore) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Opening the database failed.
    #[error(transparent)]
    Open(#[from] DbError),

    /// A stored column could not be decoded.
    #[error("corrupt subscription record for {url}: {reason}")]
    Corrupt {
        /// URL of the affected record.
        url: String,
        /// What failed to decode.
        reason: String,
    },
}

impl StoreError {
    /// Creates a corrupt-record error.
    pub fn corrupt(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
