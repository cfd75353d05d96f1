//! SQLite chat topic lookup.
//!
//! Implements `TopicRepository` from `memoria-core`. Topics are written by the
//! chat application; this side only reads them to size extraction batches.

use chrono::{DateTime, Utc};
use memoria_core::repository::topic::{TopicQuery, TopicRepository};
use memoria_types::TopicId;
use memoria_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, query_error};

/// One row of `chat_topics`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRecord {
    pub id: TopicId,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub memories_extracted_at: Option<DateTime<Utc>>,
}

/// SQLite-backed implementation of `TopicRepository`.
pub struct SqliteTopicRepository {
    pool: DatabasePool,
}

impl SqliteTopicRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert a topic or overwrite the stored one with the same id.
    pub async fn upsert_topic(&self, topic: &TopicRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_topics (id, user_id, title, created_at, memories_extracted_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 user_id = excluded.user_id,
                 title = excluded.title,
                 created_at = excluded.created_at,
                 memories_extracted_at = excluded.memories_extracted_at"#,
        )
        .bind(&topic.id)
        .bind(&topic.user_id)
        .bind(&topic.title)
        .bind(format_datetime(&topic.created_at))
        .bind(topic.memories_extracted_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }
}

impl TopicRepository for SqliteTopicRepository {
    async fn list_eligible_topics(&self, query: &TopicQuery) -> Result<Vec<TopicId>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT id FROM chat_topics
               WHERE user_id = ?1
                 AND (?2 IS NULL OR created_at >= ?2)
                 AND (?3 IS NULL OR created_at <= ?3)
                 AND (?4 OR memories_extracted_at IS NULL)
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(&query.user_id)
        .bind(query.from.as_ref().map(format_datetime))
        .bind(query.to.as_ref().map(format_datetime))
        .bind(query.include_extracted)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("id").map_err(query_error))
            .collect()
    }
}
