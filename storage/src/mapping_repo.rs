//! SQLite mapping store: persistence and queries for message links.
//!
//! Uses SqlitePoolManager and the models (MessageRecord, MappingStats).
//! Each upsert is a single-key read-modify-write inside one transaction.

use crate::error::StorageError;
use crate::models::{MappingStats, MessageRecord};
use crate::repository::MappingStore;
use crate::sqlite_pool::SqlitePoolManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SqliteMappingStore {
    pool_manager: SqlitePoolManager,
}

impl SqliteMappingStore {
    /// Opens (or creates) the database at `database_url` and ensures the schema exists.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        let store = Self { pool_manager };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        info!("Creating mapping tables if not exist");

        let pool = self.pool_manager.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_links (
                source_chat_id INTEGER NOT NULL,
                source_msg_id INTEGER NOT NULL,
                target_chat_id INTEGER,
                target_msg_id INTEGER,
                fingerprint TEXT,
                has_media INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                CHECK ((target_msg_id IS NULL) = (fingerprint IS NULL)),
                CHECK ((target_msg_id IS NULL) = (target_chat_id IS NULL))
            )
            "#,
        )
        .execute(pool)
        .await?;

        // One row per target chat, and at most one placeholder (NULL target) per source message.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_message_links_source_target
            ON message_links(source_chat_id, source_msg_id, IFNULL(target_chat_id, 0))
            "#,
        )
        .execute(pool)
        .await?;

        // Reverse lookup used by the backlog pass to skip copies that are already claimed.
        sqlx::query("DROP INDEX IF EXISTS idx_message_links_target_msg")
            .execute(pool)
            .await?;
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_message_links_target
            ON message_links(target_chat_id, target_msg_id)
            "#,
        )
        .execute(pool)
        .await?;

        info!("Mapping tables created successfully");
        Ok(())
    }
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn upsert(&self, record: &MessageRecord) -> Result<(), StorageError> {
        record.validate()?;
        let now = Utc::now();
        let mut tx = self.pool_manager.pool().begin().await?;

        let mut affected = match record.target_chat_id {
            Some(target_chat_id) => sqlx::query(
                r#"
                UPDATE message_links
                SET target_msg_id = ?, fingerprint = ?, has_media = ?, updated_at = ?
                WHERE source_chat_id = ? AND source_msg_id = ? AND target_chat_id = ?
                "#,
            )
            .bind(record.target_msg_id)
            .bind(&record.fingerprint)
            .bind(record.has_media)
            .bind(now)
            .bind(record.source_chat_id)
            .bind(record.source_msg_id)
            .bind(target_chat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            None => 0,
        };

        // A linked record takes over the placeholder; a placeholder upsert just touches it.
        if affected == 0 {
            affected = sqlx::query(
                r#"
                UPDATE message_links
                SET target_chat_id = ?, target_msg_id = ?, fingerprint = ?, has_media = ?, updated_at = ?
                WHERE source_chat_id = ? AND source_msg_id = ? AND target_chat_id IS NULL
                "#,
            )
            .bind(record.target_chat_id)
            .bind(record.target_msg_id)
            .bind(&record.fingerprint)
            .bind(record.has_media)
            .bind(now)
            .bind(record.source_chat_id)
            .bind(record.source_msg_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        if affected == 0 {
            sqlx::query(
                r#"
                INSERT INTO message_links
                    (source_chat_id, source_msg_id, target_chat_id, target_msg_id, fingerprint, has_media, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.source_chat_id)
            .bind(record.source_msg_id)
            .bind(record.target_chat_id)
            .bind(record.target_msg_id)
            .bind(&record.fingerprint)
            .bind(record.has_media)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            source_chat_id = record.source_chat_id,
            source_msg_id = record.source_msg_id,
            target_chat_id = ?record.target_chat_id,
            target_msg_id = ?record.target_msg_id,
            "Upserted message link"
        );
        Ok(())
    }

    async fn find_by_source(
        &self,
        source_chat_id: i64,
        source_msg_id: i32,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT source_chat_id, source_msg_id, target_chat_id, target_msg_id, fingerprint, has_media, updated_at
            FROM message_links
            WHERE source_chat_id = ? AND source_msg_id = ?
            ORDER BY target_chat_id
            "#,
        )
        .bind(source_chat_id)
        .bind(source_msg_id)
        .fetch_all(self.pool_manager.pool())
        .await?;

        Ok(records)
    }

    async fn exists(
        &self,
        source_chat_id: i64,
        source_msg_id: i32,
        target_chat_id: i64,
    ) -> Result<bool, StorageError> {
        let (found,): (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM message_links
                WHERE source_chat_id = ? AND source_msg_id = ? AND target_chat_id = ?
                  AND target_msg_id IS NOT NULL
            )
            "#,
        )
        .bind(source_chat_id)
        .bind(source_msg_id)
        .bind(target_chat_id)
        .fetch_one(self.pool_manager.pool())
        .await?;

        Ok(found != 0)
    }

    async fn find_by_target(
        &self,
        target_chat_id: i64,
        target_msg_id: i32,
    ) -> Result<Option<MessageRecord>, StorageError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT source_chat_id, source_msg_id, target_chat_id, target_msg_id, fingerprint, has_media, updated_at
            FROM message_links
            WHERE target_chat_id = ? AND target_msg_id = ?
            LIMIT 1
            "#,
        )
        .bind(target_chat_id)
        .bind(target_msg_id)
        .fetch_optional(self.pool_manager.pool())
        .await?;

        Ok(record)
    }

    async fn count_ready(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM message_links WHERE target_msg_id IS NOT NULL")
                .fetch_one(self.pool_manager.pool())
                .await?;
        Ok(count)
    }

    async fn count_pending(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM message_links WHERE target_msg_id IS NULL")
                .fetch_one(self.pool_manager.pool())
                .await?;
        Ok(count)
    }

    async fn stats(&self) -> Result<MappingStats, StorageError> {
        let pool = self.pool_manager.pool();

        let ready = self.count_ready().await?;
        let pending = self.count_pending().await?;

        let (source_messages,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (SELECT DISTINCT source_chat_id, source_msg_id FROM message_links)",
        )
        .fetch_one(pool)
        .await?;

        let (last_update,): (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT MAX(updated_at) FROM message_links")
                .fetch_one(pool)
                .await?;

        Ok(MappingStats {
            ready,
            pending,
            source_messages,
            last_update,
        })
    }

    async fn close(&self) {
        self.pool_manager.close().await;
    }
}
