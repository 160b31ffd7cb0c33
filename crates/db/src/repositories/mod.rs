use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use mooai_core::domain::conversation::{ContinuationRecord, ConversationKey};

pub mod continuation;
pub mod memory;

pub use continuation::SqlContinuationRepository;
pub use memory::InMemoryContinuationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("expiry {ttl_days} days from now is out of range")]
    ExpiryOutOfRange { ttl_days: i64 },
}

/// Storage for continuation handles, one row per conversation key.
///
/// `find` returns whatever is stored, expired or not; freshness is decided by the
/// caller against its own clock.
#[async_trait]
pub trait ContinuationRepository: Send + Sync {
    async fn find(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ContinuationRecord>, RepositoryError>;

    /// Inserts or fully replaces the record for `record.key`.
    async fn upsert(&self, record: ContinuationRecord) -> Result<(), RepositoryError>;

    /// Removes every record with `expires_at <= now`, returning how many went.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
