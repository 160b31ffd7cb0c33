use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Identity of one continuation context: who is talking, where, and in which thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: String,
    pub channel_id: String,
    pub thread_id: String,
}

impl ConversationKey {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Self {
        Self { user_id: user_id.into(), channel_id: channel_id.into(), thread_id: thread_id.into() }
    }

    /// Builds a key from optional event fields, naming the first one that is missing.
    pub fn from_parts(
        user_id: Option<&str>,
        channel_id: Option<&str>,
        thread_id: Option<&str>,
    ) -> Result<Self, DomainError> {
        let user_id = required("user_id", user_id)?;
        let channel_id = required("channel_id", channel_id)?;
        let thread_id = required("thread_id", thread_id)?;
        Ok(Self::new(user_id, channel_id, thread_id))
    }
}

fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, DomainError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DomainError::MissingIdentity(field.to_owned())),
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.channel_id, self.thread_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationRecord {
    pub key: ConversationKey,
    pub handle: String,
    pub expires_at: DateTime<Utc>,
}

impl ContinuationRecord {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
