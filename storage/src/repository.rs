//! The mapping store contract shared by the relay engine and the backlog reconciler.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{MappingStats, MessageRecord};

/// Durable relation between a source message and its copies in the target chats.
///
/// Every operation is idempotent and safe to retry. Implementations never assume a transaction
/// spanning more than one key.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Inserts or overwrites the (source_chat_id, source_msg_id, target_chat_id) record and
    /// stamps `updated_at`. A linked record claims an existing placeholder of the same source
    /// message.
    async fn upsert(&self, record: &MessageRecord) -> Result<(), StorageError>;

    /// Full fan-out of a source message, placeholders included. Possibly empty.
    async fn find_by_source(
        &self,
        source_chat_id: i64,
        source_msg_id: i32,
    ) -> Result<Vec<MessageRecord>, StorageError>;

    /// True when the source message is already linked to a message in `target_chat_id`.
    /// Placeholders do not count.
    async fn exists(
        &self,
        source_chat_id: i64,
        source_msg_id: i32,
        target_chat_id: i64,
    ) -> Result<bool, StorageError>;

    /// The record whose copy is `target_msg_id` in `target_chat_id`, if any.
    async fn find_by_target(
        &self,
        target_chat_id: i64,
        target_msg_id: i32,
    ) -> Result<Option<MessageRecord>, StorageError>;

    /// Number of records linked to a target message.
    async fn count_ready(&self) -> Result<i64, StorageError>;

    /// Number of placeholders.
    async fn count_pending(&self) -> Result<i64, StorageError>;

    async fn stats(&self) -> Result<MappingStats, StorageError>;

    /// Flushes and releases the backing resources. Default: nothing to release.
    async fn close(&self) {}
}
