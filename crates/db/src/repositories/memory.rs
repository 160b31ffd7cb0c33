use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use mooai_core::domain::conversation::{ContinuationRecord, ConversationKey};

use super::{ContinuationRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryContinuationRepository {
    records: RwLock<HashMap<ConversationKey, ContinuationRecord>>,
}

impl InMemoryContinuationRepository {
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ContinuationRepository for InMemoryContinuationRepository {
    async fn find(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ContinuationRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn upsert(&self, record: ContinuationRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.is_live_at(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use mooai_core::domain::conversation::{ContinuationRecord, ConversationKey};

    use super::InMemoryContinuationRepository;
    use crate::repositories::ContinuationRepository;

    #[tokio::test]
    async fn in_memory_repo_upserts_and_prunes() {
        let repo = InMemoryContinuationRepository::default();
        let key = ConversationKey::new("U1", "C1", "1700.1");

        repo.upsert(ContinuationRecord {
            key: key.clone(),
            handle: "resp_1".to_owned(),
            expires_at: Utc::now() - Duration::seconds(1),
        })
        .await
        .expect("upsert");
        repo.upsert(ContinuationRecord {
            key: key.clone(),
            handle: "resp_2".to_owned(),
            expires_at: Utc::now() + Duration::days(1),
        })
        .await
        .expect("upsert");

        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.find(&key).await.expect("find").map(|r| r.handle), Some("resp_2".into()));
        assert_eq!(repo.delete_expired(Utc::now()).await.expect("prune"), 0);
        assert_eq!(repo.delete_expired(Utc::now() + Duration::days(2)).await.expect("prune"), 1);
        assert!(repo.is_empty().await);
    }
}
