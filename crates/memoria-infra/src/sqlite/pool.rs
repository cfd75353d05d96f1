//! Database pool with split reader/writer connections in WAL mode.
//!
//! Ledger increments, checkpoint writes and task creation all go through the
//! single-connection writer pool, so SQLite never sees two writers racing.
//! Lookups that must observe the latest write (active-task checks, checkpoint
//! reads) also use the writer; everything else reads through the reader pool.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::resolve_data_dir;

const DATABASE_FILE: &str = "memoria.db";
const READER_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Split read/write pool for SQLite with WAL mode.
#[derive(Clone)]
pub struct DatabasePool {
    /// Up to 8 read-only connections.
    pub reader: SqlitePool,
    /// Exactly one connection.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open `{data_dir}/memoria.db`, creating it if needed.
    pub async fn open(data_dir: &Path) -> Result<Self, sqlx::Error> {
        Self::new(&database_url(data_dir)).await
    }

    /// Open both pools and bring the schema up to date.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        // The reader pool is read-only and must see the migrated schema.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options.read_only(true))
            .await?;

        tracing::debug!(database_url, "database pools ready");
        Ok(Self { reader, writer })
    }
}

pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join(DATABASE_FILE).display())
}

/// Database URL inside the resolved data directory.
pub fn default_database_url() -> String {
    database_url(&resolve_data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open(dir.path()).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(
            names,
            vec!["async_tasks", "chat_topics", "workflow_runs", "workflow_steps"]
        );
        assert!(dir.path().join(DATABASE_FILE).exists());
    }

    #[tokio::test]
    async fn writer_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open(dir.path()).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        DatabasePool::open(dir.path()).await.unwrap();
        DatabasePool::open(dir.path()).await.unwrap();
    }

    #[test]
    fn url_points_into_data_dir() {
        let url = database_url(Path::new("/tmp/memoria-data"));
        assert_eq!(url, "sqlite:///tmp/memoria-data/memoria.db?mode=rwc");
        assert!(default_database_url().contains(DATABASE_FILE));
    }
}
