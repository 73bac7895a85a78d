use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SearchError, SearchResult};

/// Open a downloaded index snapshot for querying.
///
/// The pool is read-only and holds a single connection. Lock waits and waits
/// for that connection are both bounded by `busy_timeout`. Fails with
/// [`SearchError::Open`] when the file is missing, is not SQLite, or has no
/// `packages` table.
///
/// Error messages never name `path`; it is only recorded in log events.
pub async fn open_index(path: &Path, busy_timeout: Duration) -> SearchResult<SqlitePool> {
    if !path.is_file() {
        warn!(path = %path.display(), "snapshot file is missing");
        return Err(SearchError::Open("snapshot not found".to_string()));
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(busy_timeout)
        .connect_with(options)
        .await
        .map_err(|e| SearchError::Open(e.to_string()))?;

    // A non-SQLite file only fails once a statement touches it.
    let has_packages: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type IN ('table', 'view') AND name = 'packages'",
    )
    .fetch_one(&pool)
    .await
    .map_err(|e| SearchError::Open(e.to_string()))?;

    if !has_packages {
        pool.close().await;
        warn!(path = %path.display(), "snapshot has no packages table");
        return Err(SearchError::Open(
            "snapshot is not a package index (no packages table)".to_string(),
        ));
    }

    debug!(path = %path.display(), "opened package index");
    Ok(pool)
}
