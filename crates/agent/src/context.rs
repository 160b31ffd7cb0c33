use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use mooai_core::domain::conversation::{ContinuationRecord, ConversationKey};
use mooai_db::repositories::{ContinuationRepository, RepositoryError};

pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Continuation handles per conversation, with lazy expiry.
///
/// Different keys never contend. Callers that read a handle, call the model and
/// write the new handle take a [`ContextLease`] so that sequence is serialized
/// per key.
pub struct ContextStore {
    repository: Arc<dyn ContinuationRepository>,
    ttl_days: i64,
    locks: Mutex<HashMap<ConversationKey, Weak<Mutex<()>>>>,
}

impl ContextStore {
    pub fn new(repository: Arc<dyn ContinuationRepository>, ttl_days: i64) -> Self {
        Self { repository, ttl_days, locks: Mutex::new(HashMap::new()) }
    }

    /// Returns the stored handle only while `now < expires_at`.
    pub async fn get(&self, key: &ConversationKey) -> Result<Option<String>, RepositoryError> {
        let record = self.repository.find(key).await?;
        let now = Utc::now();
        Ok(record.filter(|record| record.is_live_at(now)).map(|record| record.handle))
    }

    pub async fn put(&self, key: &ConversationKey, handle: &str) -> Result<(), RepositoryError> {
        self.put_with_ttl(key, handle, self.ttl_days).await
    }

    pub async fn put_with_ttl(
        &self,
        key: &ConversationKey,
        handle: &str,
        ttl_days: i64,
    ) -> Result<(), RepositoryError> {
        let _guard = self.key_lock(key).await.lock_owned().await;
        self.write(key, handle, ttl_days).await
    }

    /// Holds the per-key lock until the lease is dropped.
    pub async fn lease(&self, key: &ConversationKey) -> ContextLease<'_> {
        let guard = self.key_lock(key).await.lock_owned().await;
        ContextLease { store: self, key: key.clone(), _guard: guard }
    }

    async fn write(
        &self,
        key: &ConversationKey,
        handle: &str,
        ttl_days: i64,
    ) -> Result<(), RepositoryError> {
        let expires_at = Duration::try_days(ttl_days)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or(RepositoryError::ExpiryOutOfRange { ttl_days })?;
        self.repository
            .upsert(ContinuationRecord { key: key.clone(), handle: handle.to_owned(), expires_at })
            .await?;
        debug!(
            event_name = "agent.context.stored",
            conversation = %key,
            expires_at = %expires_at,
            "continuation handle stored"
        );
        Ok(())
    }

    async fn key_lock(&self, key: &ConversationKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }
}

/// Exclusive access to one conversation's handle.
pub struct ContextLease<'a> {
    store: &'a ContextStore,
    key: ConversationKey,
    _guard: OwnedMutexGuard<()>,
}

impl ContextLease<'_> {
    pub async fn get(&self) -> Result<Option<String>, RepositoryError> {
        self.store.get(&self.key).await
    }

    pub async fn put(&self, handle: &str) -> Result<(), RepositoryError> {
        self.store.write(&self.key, handle, self.store.ttl_days).await
    }
}
