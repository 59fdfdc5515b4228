//! The storage seam and its in-process implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{StoreError, Subscription};

/// Persistent home of subscription records.
///
/// Records are addressed by URL. `lookup` never fails for an unknown URL: it
/// creates an unlisted record, mirroring how a redirect target comes into
/// existence. The active set is ordered; `listed` returns a snapshot so callers
/// may mutate the set while walking the result.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Returns the record for `url`, creating an unlisted one if absent.
    async fn lookup(&self, url: &str) -> Result<Subscription, StoreError>;

    /// Writes back every field except `listed`, which only `add`/`remove`/`replace` change.
    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// Saves the record and appends it to the active set. No-op on membership if already listed.
    async fn add(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// Removes `url` from the active set. The record itself is kept.
    async fn remove(&self, url: &str) -> Result<(), StoreError>;

    /// Atomically swaps `old_url` for `subscription` in the active set, keeping its position.
    async fn replace(&self, old_url: &str, subscription: &Subscription) -> Result<(), StoreError>;

    /// Snapshot of the active set, in order.
    async fn listed(&self) -> Result<Vec<Subscription>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, Subscription>,
    active: Vec<String>,
}

impl MemoryState {
    fn upsert(&mut self, subscription: &Subscription) {
        let listed = self.active.iter().any(|url| url == &subscription.url);
        let mut record = subscription.clone();
        record.listed = listed;
        self.records.insert(record.url.clone(), record);
    }

    fn set_listed(&mut self, url: &str, listed: bool) {
        if let Some(record) = self.records.get_mut(url) {
            record.listed = listed;
        }
    }
}

/// Process-local store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn lookup(&self, url: &str) -> Result<Subscription, StoreError> {
        let mut state = self.state();
        let record = state
            .records
            .entry(url.to_string())
            .or_insert_with(|| Subscription::new(url));
        Ok(record.clone())
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.state().upsert(subscription);
        Ok(())
    }

    #[instrument(skip(self, subscription), fields(url = %subscription.url))]
    async fn add(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut state = self.state();
        if !state.active.contains(&subscription.url) {
            state.active.push(subscription.url.clone());
            debug!("subscription added to active set");
        }
        state.upsert(subscription);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, url: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.active.retain(|active| active != url);
        state.set_listed(url, false);
        Ok(())
    }

    #[instrument(skip(self, subscription), fields(new_url = %subscription.url))]
    async fn replace(&self, old_url: &str, subscription: &Subscription) -> Result<(), StoreError> {
        let mut state = self.state();
        state.active.retain(|active| active != &subscription.url);
        let position = state.active.iter().position(|active| active == old_url);
        match position {
            Some(index) => state.active[index] = subscription.url.clone(),
            None => state.active.push(subscription.url.clone()),
        }
        state.set_listed(old_url, false);
        state.upsert(subscription);
        debug!("subscription replaced in active set");
        Ok(())
    }

    async fn listed(&self) -> Result<Vec<Subscription>, StoreError> {
        let state = self.state();
        Ok(state
            .active
            .iter()
            .filter_map(|url| state.records.get(url).cloned())
            .collect())
    }
}
