#![allow(dead_code)]

use async_trait::async_trait;
use rippkgs_search::error::{SearchError, SearchResult};
use rippkgs_search::index::IndexCell;
use rippkgs_search::snapshot::SnapshotSource;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Packages used by the ranking scenarios.
pub const CURL_FIXTURE: &[(&str, &str)] = &[
    ("mycurl", "2.0"),
    ("curly-lib", "1.0"),
    ("curl", "8.0"),
    ("curl", "7.80"),
];

/// Write a `packages(name, version)` database at `path`.
pub async fn build_index(path: &Path, rows: &[(&str, &str)]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    sqlx::query("CREATE TABLE packages (name TEXT, version TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    for (name, version) in rows {
        sqlx::query("INSERT INTO packages (name, version) VALUES (?, ?)")
            .bind(*name)
            .bind(*version)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
}

/// Snapshot source that copies a fixture database and counts fetches.
///
/// The first `failures` fetches fail. Every fetch sleeps for `delay` first so
/// concurrent callers overlap.
pub struct CountingSource {
    fixture: PathBuf,
    fetches: Arc<AtomicUsize>,
    failures: usize,
    delay: Duration,
}

impl CountingSource {
    pub fn new(fixture: PathBuf) -> Self {
        Self {
            fixture,
            fetches: Arc::new(AtomicUsize::new(0)),
            failures: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_first(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }
}

#[async_trait]
impl SnapshotSource for CountingSource {
    fn describe(&self) -> String {
        format!("test://{}", self.fixture.display())
    }

    async fn fetch_to(&self, dest: &Path) -> SearchResult<u64> {
        let attempt = self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if attempt < self.failures {
            return Err(SearchError::Fetch("simulated network blip".to_string()));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SearchError::Fetch(e.to_string()))?;
        }
        tokio::fs::copy(&self.fixture, dest)
            .await
            .map_err(|e| SearchError::Fetch(e.to_string()))
    }
}

/// A temp dir holding a fixture index plus the cell that will fetch it.
pub struct Harness {
    pub tmp: TempDir,
    pub fetches: Arc<AtomicUsize>,
    pub index: Arc<IndexCell>,
}

pub async fn harness(
    rows: &[(&str, &str)],
    configure: impl FnOnce(CountingSource) -> CountingSource,
) -> Harness {
    let tmp = TempDir::new().unwrap();
    let fixture = tmp.path().join("fixture.sqlite");
    build_index(&fixture, rows).await;

    let source = configure(CountingSource::new(fixture));
    let fetches = source.counter();
    let index = Arc::new(IndexCell::new(
        Box::new(source),
        tmp.path().join("cache").join("index.sqlite"),
        Duration::from_secs(2),
    ));

    Harness {
        tmp,
        fetches,
        index,
    }
}
