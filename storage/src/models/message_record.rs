//! Mapping record model for persistence.
//!
//! Maps to the `message_links` table and is used by every [`crate::MappingStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// One relayed (source message, target message) pair, or a placeholder for a known source
/// message that has not been relayed anywhere yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRecord {
    pub source_chat_id: i64,
    pub source_msg_id: i32,
    /// `None` only on placeholders.
    pub target_chat_id: Option<i64>,
    /// `None` only on placeholders.
    pub target_msg_id: Option<i32>,
    /// Content digest of the source message at the time of the last relay.
    pub fingerprint: Option<String>,
    /// Whether the relayed copy carries media (media cannot be edited in place).
    pub has_media: bool,
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Record for a source message relayed to `target_chat_id` as `target_msg_id`.
    pub fn linked(
        source_chat_id: i64,
        source_msg_id: i32,
        target_chat_id: i64,
        target_msg_id: i32,
        fingerprint: impl Into<String>,
        has_media: bool,
    ) -> Self {
        Self {
            source_chat_id,
            source_msg_id,
            target_chat_id: Some(target_chat_id),
            target_msg_id: Some(target_msg_id),
            fingerprint: Some(fingerprint.into()),
            has_media,
            updated_at: Utc::now(),
        }
    }

    /// Tracking-only record: the source message is known but not linked to any target.
    pub fn placeholder(source_chat_id: i64, source_msg_id: i32) -> Self {
        Self {
            source_chat_id,
            source_msg_id,
            target_chat_id: None,
            target_msg_id: None,
            fingerprint: None,
            has_media: false,
            updated_at: Utc::now(),
        }
    }

    /// True when this record points at a real target message and may receive edits.
    pub fn is_linked(&self) -> bool {
        self.target_msg_id.is_some()
    }

    /// Checks the field invariants; stores refuse records failing this.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.target_msg_id.is_some() != self.fingerprint.is_some() {
            return Err(StorageError::Invalid(format!(
                "fingerprint must be set exactly when target_msg_id is set (source {}/{})",
                self.source_chat_id, self.source_msg_id
            )));
        }
        if self.target_msg_id.is_some() != self.target_chat_id.is_some() {
            return Err(StorageError::Invalid(format!(
                "target_chat_id and target_msg_id must be set together (source {}/{})",
                self.source_chat_id, self.source_msg_id
            )));
        }
        Ok(())
    }
}
