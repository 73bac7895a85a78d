//! TOML configuration for the search service.
//!
//! ```toml
//! [snapshot]
//! provider = "s3"
//! bucket = "rippkgs-index"
//! key = "rippkgs-index.sqlite"
//! region = "us-east-1"
//! local_path = "/tmp/rippkgs-index.sqlite"
//!
//! [db]
//! busy_timeout_secs = 5
//!
//! [server]
//! bind = "0.0.0.0:8080"
//! ```
//!
//! Serverless deploys often ship without a config file, so a handful of
//! environment variables override (or, via [`Config::from_env`], replace) the
//! file: `RIPPKGS_BUCKET`, `RIPPKGS_OBJECT`, `RIPPKGS_LOCAL_PATH`, `PORT`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint (MinIO, GCS interoperability, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Source file for `provider = "file"`.
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            bucket: String::new(),
            key: default_key(),
            region: default_region(),
            endpoint_url: None,
            source_path: None,
            local_path: default_local_path(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "s3".to_string()
}
fn default_key() -> String {
    "rippkgs-index.sqlite".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_local_path() -> PathBuf {
    std::env::temp_dir().join("rippkgs-index.sqlite")
}
fn default_fetch_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Upper bound on lock waits and on waiting for the single connection.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl DbConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    /// Build a configuration from defaults plus environment overrides.
    ///
    /// Used when no config file is present.
    pub fn from_env() -> Result<Config> {
        let mut config = Config {
            snapshot: SnapshotConfig::default(),
            db: DbConfig::default(),
            server: ServerConfig::default(),
        };
        config.apply_env_overrides();
        validate(&config)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bucket) = lookup("RIPPKGS_BUCKET") {
            self.snapshot.bucket = bucket;
        }
        if let Some(key) = lookup("RIPPKGS_OBJECT") {
            self.snapshot.key = key;
        }
        if let Some(path) = lookup("RIPPKGS_LOCAL_PATH") {
            self.snapshot.local_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("PORT") {
            self.server.bind = format!("0.0.0.0:{}", port);
        }
    }
}

/// Load the config file at `path`, or fall back to [`Config::from_env`] when
/// the file does not exist.
pub fn load_or_env(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Config::from_env()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    config.apply_env_overrides();
    validate(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

fn validate(config: &Config) -> Result<()> {
    match config.snapshot.provider.as_str() {
        "s3" => {
            if config.snapshot.bucket.is_empty() {
                anyhow::bail!("snapshot.bucket must be set when provider is 's3'");
            }
            if config.snapshot.key.is_empty() {
                anyhow::bail!("snapshot.key must be set when provider is 's3'");
            }
        }
        "file" => {
            if config.snapshot.source_path.is_none() {
                anyhow::bail!("snapshot.source_path must be set when provider is 'file'");
            }
        }
        other => anyhow::bail!(
            "Unknown snapshot provider: '{}'. Must be s3 or file.",
            other
        ),
    }

    if config.snapshot.timeout_secs == 0 {
        anyhow::bail!("snapshot.timeout_secs must be > 0");
    }

    if config.db.busy_timeout_secs == 0 {
        anyhow::bail!("db.busy_timeout_secs must be > 0");
    }

    Ok(())
}
