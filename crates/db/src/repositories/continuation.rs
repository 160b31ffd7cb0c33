use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use tracing::debug;

use mooai_core::domain::conversation::{ContinuationRecord, ConversationKey};

use super::{ContinuationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContinuationRepository {
    pool: DbPool,
}

impl SqlContinuationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// Fixed-width UTC timestamps so string comparison in SQL matches time order.
fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid expires_at `{raw}`: {e}")))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ContinuationRecord, RepositoryError> {
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_id: String =
        row.try_get("channel_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let thread_ts: String =
        row.try_get("thread_ts").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let response_id: String =
        row.try_get("response_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ContinuationRecord {
        key: ConversationKey::new(user_id, channel_id, thread_ts),
        handle: response_id,
        expires_at: decode_timestamp(&expires_at)?,
    })
}

#[async_trait::async_trait]
impl ContinuationRepository for SqlContinuationRepository {
    async fn find(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ContinuationRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, channel_id, thread_ts, response_id, expires_at
             FROM agent_response_map
             WHERE user_id = ? AND channel_id = ? AND thread_ts = ?",
        )
        .bind(&key.user_id)
        .bind(&key.channel_id)
        .bind(&key.thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn upsert(&self, record: ContinuationRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent_response_map
                (user_id, channel_id, thread_ts, response_id, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, channel_id, thread_ts) DO UPDATE SET
                response_id = excluded.response_id,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(&record.key.user_id)
        .bind(&record.key.channel_id)
        .bind(&record.key.thread_id)
        .bind(&record.handle)
        .bind(encode_timestamp(record.expires_at))
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM agent_response_map WHERE expires_at <= ?")
            .bind(encode_timestamp(now))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        debug!(
            event_name = "db.continuation.pruned",
            removed,
            "expired continuation records removed"
        );
        Ok(removed)
    }
}
