//! # In-memory mapping store
//!
//! [`MappingStore`] backed by a `HashMap`; same semantics as the SQLite store.
//! Used by tests and by dry runs where nothing has to survive a restart.
//!
//! The store uses `Arc<RwLock<>>` so clones share the same map.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::models::{MappingStats, MessageRecord};
use crate::repository::MappingStore;

/// (source_chat_id, source_msg_id, target_chat_id); `None` target is the placeholder slot.
type LinkKey = (i64, i32, Option<i64>);

#[derive(Debug, Clone, Default)]
pub struct InMemoryMappingStore {
    records: Arc<RwLock<HashMap<LinkKey, MessageRecord>>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record, ordered by source then target; handy for assertions.
    pub async fn snapshot(&self) -> Vec<MessageRecord> {
        let records = self.records.read().await;
        let mut all: Vec<MessageRecord> = records.values().cloned().collect();
        all.sort_by_key(|r| (r.source_chat_id, r.source_msg_id, r.target_chat_id));
        all
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn upsert(&self, record: &MessageRecord) -> Result<(), StorageError> {
        record.validate()?;
        let mut stored = record.clone();
        stored.updated_at = Utc::now();

        let mut records = self.records.write().await;
        let key = (record.source_chat_id, record.source_msg_id, record.target_chat_id);
        let placeholder_key = (record.source_chat_id, record.source_msg_id, None);

        if record.target_chat_id.is_some() && !records.contains_key(&key) {
            records.remove(&placeholder_key);
        }
        records.insert(key, stored);
        Ok(())
    }

    async fn find_by_source(
        &self,
        source_chat_id: i64,
        source_msg_id: i32,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let records = self.records.read().await;
        let mut found: Vec<MessageRecord> = records
            .values()
            .filter(|r| r.source_chat_id == source_chat_id && r.source_msg_id == source_msg_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.target_chat_id);
        Ok(found)
    }

    async fn exists(
        &self,
        source_chat_id: i64,
        source_msg_id: i32,
        target_chat_id: i64,
    ) -> Result<bool, StorageError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(source_chat_id, source_msg_id, Some(target_chat_id)))
            .map(MessageRecord::is_linked)
            .unwrap_or(false))
    }

    async fn find_by_target(
        &self,
        target_chat_id: i64,
        target_msg_id: i32,
    ) -> Result<Option<MessageRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| {
                r.target_chat_id == Some(target_chat_id) && r.target_msg_id == Some(target_msg_id)
            })
            .cloned())
    }

    async fn count_ready(&self) -> Result<i64, StorageError> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| r.is_linked()).count() as i64)
    }

    async fn count_pending(&self) -> Result<i64, StorageError> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| !r.is_linked()).count() as i64)
    }

    async fn stats(&self) -> Result<MappingStats, StorageError> {
        let records = self.records.read().await;
        let mut sources: Vec<(i64, i32)> = records
            .values()
            .map(|r| (r.source_chat_id, r.source_msg_id))
            .collect();
        sources.sort_unstable();
        sources.dedup();

        Ok(MappingStats {
            ready: records.values().filter(|r| r.is_linked()).count() as i64,
            pending: records.values().filter(|r| !r.is_linked()).count() as i64,
            source_messages: sources.len() as i64,
            last_update: records.values().map(|r| r.updated_at).max(),
        })
    }
}
