//! Snapshot fetching.
//!
//! Copies the prebuilt package index from its remote home into a local file.
//! The index is produced elsewhere and treated as immutable, so one fetch per
//! process is enough.
//!
//! Every source writes to `<local_path>.partial` first and renames it over
//! `local_path` only once the copy completes, so a failed fetch never leaves
//! a truncated index where [`crate::db::open_index`] would find it.
//!
//! Errors reach HTTP clients, so their messages stay free of local paths,
//! bucket names and endpoint URLs. Those go to `tracing` instead.
//!
//! | Provider | Source |
//! |----------|--------|
//! | `s3` | [`S3Source`]: S3 `GetObject` (or any S3-compatible endpoint) |
//! | `file` | [`LocalFileSource`]: a file on local disk |

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::config::SnapshotConfig;
use crate::error::{SearchError, SearchResult};
use crate::sigv4::{encode_key, sign_get, AwsCredentials};

/// A place the index snapshot can be fetched from.
///
/// Implementations must fully overwrite `dest` on success.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Human-readable location, used in logs (e.g. `s3://bucket/key`).
    fn describe(&self) -> String;

    /// Copy the snapshot to `dest`, returning the number of bytes written.
    async fn fetch_to(&self, dest: &Path) -> SearchResult<u64>;
}

/// Build the source named by `snapshot.provider`.
pub fn source_from_config(config: &SnapshotConfig) -> SearchResult<Box<dyn SnapshotSource>> {
    match config.provider.as_str() {
        "s3" => Ok(Box::new(S3Source::new(config.clone())?)),
        "file" => match config.source_path {
            Some(ref path) => Ok(Box::new(LocalFileSource::new(path.clone()))),
            None => Err(SearchError::Fetch(
                "snapshot.source_path is not set".to_string(),
            )),
        },
        other => Err(SearchError::Fetch(format!(
            "unknown snapshot provider: {}",
            other
        ))),
    }
}

// ============ S3 ============

/// Fetches one object from S3 or an S3-compatible store.
///
/// Requests are signed with SigV4 when AWS credentials are present in the
/// environment and sent anonymously otherwise (public buckets).
pub struct S3Source {
    config: SnapshotConfig,
    client: reqwest::Client,
    creds: Option<AwsCredentials>,
}

impl S3Source {
    pub fn new(config: SnapshotConfig) -> SearchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::Fetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            creds: AwsCredentials::from_env(),
        })
    }

    /// Scheme, host, and canonical URI for the configured object.
    ///
    /// A custom `endpoint_url` is addressed path-style
    /// (`endpoint/bucket/key`); AWS itself is addressed virtual-hosted style.
    fn object_location(&self) -> (String, String, String) {
        let key = encode_key(self.config.key.trim_start_matches('/'));
        match self.config.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                let uri = format!("/{}/{}", encode_key(&self.config.bucket), key);
                (scheme.to_string(), host, uri)
            }
            None => (
                "https".to_string(),
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
                format!("/{}", key),
            ),
        }
    }
}

#[async_trait]
impl SnapshotSource for S3Source {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.config.bucket, self.config.key)
    }

    async fn fetch_to(&self, dest: &Path) -> SearchResult<u64> {
        let (scheme, host, uri) = self.object_location();
        let url = format!("{}://{}{}", scheme, host, uri);

        let mut req = self.client.get(&url);
        if let Some(ref creds) = self.creds {
            let signed = sign_get(creds, &host, &uri, &self.config.region, Utc::now());
            req = req
                .header("Authorization", signed.authorization)
                .header("x-amz-content-sha256", signed.content_sha256)
                .header("x-amz-date", signed.amz_date);
            if let Some(token) = signed.security_token {
                req = req.header("x-amz-security-token", token);
            }
        }

        let mut resp = req.send().await.map_err(|e| {
            warn!(source = %self.describe(), url = %url, error = %e, "S3 request failed");
            SearchError::Fetch(format!("S3 request failed: {}", e.without_url()))
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            warn!(source = %self.describe(), "snapshot object does not exist");
            return Err(SearchError::Fetch("object not found".to_string()));
        }
        if !status.is_success() {
            warn!(source = %self.describe(), status = %status, "S3 GetObject rejected");
            return Err(SearchError::Fetch(format!(
                "S3 GetObject failed (HTTP {})",
                status.as_u16()
            )));
        }

        ensure_parent(dest).await?;
        let partial = partial_path(dest);
        let result: SearchResult<u64> = async {
            let mut file = tokio::fs::File::create(&partial)
                .await
                .map_err(|e| write_error(&partial, e))?;
            let mut written = 0u64;
            while let Some(chunk) = resp.chunk().await.map_err(|e| {
                warn!(source = %self.describe(), error = %e, "S3 body read failed");
                SearchError::Fetch(format!("failed reading object body: {}", e.without_url()))
            })? {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| write_error(&partial, e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| write_error(&partial, e))?;
            file.sync_all().await.map_err(|e| write_error(&partial, e))?;
            Ok(written)
        }
        .await;

        finish_partial(&partial, dest, result).await
    }
}

// ============ Local file ============

/// Copies a snapshot that already sits on local disk.
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SnapshotSource for LocalFileSource {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    async fn fetch_to(&self, dest: &Path) -> SearchResult<u64> {
        if !self.path.is_file() {
            warn!(source = %self.describe(), "snapshot source file does not exist");
            return Err(SearchError::Fetch("object not found".to_string()));
        }

        ensure_parent(dest).await?;
        let partial = partial_path(dest);
        let result = tokio::fs::copy(&self.path, &partial)
            .await
            .map_err(|e| write_error(&partial, e));

        finish_partial(&partial, dest, result).await
    }
}

// ============ Helpers ============

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

async fn ensure_parent(dest: &Path) -> SearchResult<()> {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_error(parent, e)),
        _ => Ok(()),
    }
}

fn write_error(path: &Path, err: std::io::Error) -> SearchError {
    warn!(path = %path.display(), error = %err, "writing snapshot failed");
    SearchError::Fetch(format!("failed to write snapshot: {}", err.kind()))
}

/// Rename a completed partial file into place, or remove it on failure.
async fn finish_partial(
    partial: &Path,
    dest: &Path,
    result: SearchResult<u64>,
) -> SearchResult<u64> {
    match result {
        Ok(written) => {
            tokio::fs::rename(partial, dest)
                .await
                .map_err(|e| write_error(dest, e))?;
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(partial).await;
            Err(e)
        }
    }
}
