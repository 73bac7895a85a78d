//! Lazily initialized package index.
//!
//! The first search fetches the snapshot and opens it; every later search
//! reuses the open pool. Concurrent first requests share one fetch-and-open
//! attempt. A failed attempt is not cached, so the next request tries again
//! instead of failing forever after one cold-start network blip.
//!
//! ```text
//! Uninitialized ──▶ Initializing ──▶ Ready
//!       ▲                 │
//!       └──── Failed ◀────┘
//! ```

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::error::SearchResult;
use crate::snapshot::{source_from_config, SnapshotSource};

/// Observable lifecycle of an [`IndexCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Initializing,
    Ready,
    /// The last attempt failed; the next [`IndexCell::get`] retries.
    Failed,
}

impl IndexState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Ready => 2,
            Self::Failed => 3,
        }
    }
}

/// Owns the snapshot source and, once ready, the open index pool.
pub struct IndexCell {
    source: Box<dyn SnapshotSource>,
    local_path: PathBuf,
    busy_timeout: Duration,
    reuse_existing: bool,
    pool: OnceCell<SqlitePool>,
    state: AtomicU8,
}

impl IndexCell {
    pub fn new(
        source: Box<dyn SnapshotSource>,
        local_path: PathBuf,
        busy_timeout: Duration,
    ) -> Self {
        Self {
            source,
            local_path,
            busy_timeout,
            reuse_existing: false,
            pool: OnceCell::new(),
            state: AtomicU8::new(IndexState::Uninitialized.as_u8()),
        }
    }

    /// Build a cell from the `[snapshot]` and `[db]` config sections.
    pub fn from_config(config: &Config) -> SearchResult<Self> {
        let source = source_from_config(&config.snapshot)?;
        Ok(Self::new(
            source,
            config.snapshot.local_path.clone(),
            config.db.busy_timeout(),
        ))
    }

    /// Skip the fetch when a snapshot already exists at the local path.
    pub fn reuse_existing(mut self, reuse: bool) -> Self {
        self.reuse_existing = reuse;
        self
    }

    pub fn state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Return the open pool, fetching and opening the snapshot first if no
    /// attempt has succeeded yet.
    pub async fn get(&self) -> SearchResult<&SqlitePool> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        self.pool.get_or_try_init(|| self.initialize()).await
    }

    /// Initialize eagerly, e.g. at startup.
    pub async fn warm(&self) -> SearchResult<()> {
        self.get().await.map(|_| ())
    }

    async fn initialize(&self) -> SearchResult<SqlitePool> {
        let mut guard = StateGuard::enter(&self.state);

        match self.fetch_and_open().await {
            Ok(pool) => {
                guard.finish(IndexState::Ready);
                Ok(pool)
            }
            Err(e) => {
                warn!(source = %self.source.describe(), error = %e, "index initialization failed");
                guard.finish(IndexState::Failed);
                Err(e)
            }
        }
    }

    async fn fetch_and_open(&self) -> SearchResult<SqlitePool> {
        if self.reuse_existing && self.local_path.is_file() {
            info!(path = %self.local_path.display(), "reusing existing snapshot");
        } else {
            info!(
                source = %self.source.describe(),
                path = %self.local_path.display(),
                "fetching snapshot"
            );
            let bytes = self.source.fetch_to(&self.local_path).await?;
            info!(bytes, "snapshot fetched");
        }
        db::open_index(&self.local_path, self.busy_timeout).await
    }
}

/// Marks the cell `Initializing` for the lifetime of one attempt.
///
/// If the attempt is dropped mid-flight (the request that drove it went away)
/// the state falls back to `Uninitialized`.
struct StateGuard<'a> {
    state: &'a AtomicU8,
    done: bool,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a AtomicU8) -> Self {
        state.store(IndexState::Initializing.as_u8(), Ordering::Release);
        Self { state, done: false }
    }

    fn finish(&mut self, outcome: IndexState) {
        self.state.store(outcome.as_u8(), Ordering::Release);
        self.done = true;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.state
                .store(IndexState::Uninitialized.as_u8(), Ordering::Release);
        }
    }
}
