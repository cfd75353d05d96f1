//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod checkpoint;
pub mod pool;
pub mod task;
pub mod topic;

use chrono::{DateTime, SecondsFormat, Utc};
use memoria_types::error::RepositoryError;

/// Fixed-width RFC 3339 in UTC, so stored timestamps compare as text.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Fresh migrated database in a temp dir. Keep the `TempDir` alive.
#[cfg(test)]
pub(crate) async fn test_pool() -> (pool::DatabasePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool::DatabasePool::open(dir.path()).await.unwrap();
    (pool, dir)
}
