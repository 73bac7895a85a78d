//! # rippkgs-search CLI
//!
//! ```bash
//! rippkgs-search --config ./config/rippkgs.toml serve
//! rippkgs-search search curl
//! rippkgs-search fetch
//! ```
//!
//! When the config file does not exist, configuration is read from the
//! environment (`RIPPKGS_BUCKET`, `RIPPKGS_OBJECT`, `RIPPKGS_LOCAL_PATH`,
//! `PORT`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rippkgs_search::{config, index::IndexCell, search, server};

/// Ranked package-name search over a SQLite index snapshot.
#[derive(Parser)]
#[command(name = "rippkgs-search", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rippkgs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Fetch and open the index before accepting requests.
        #[arg(long)]
        eager: bool,

        /// Use an existing local snapshot instead of downloading a new one.
        #[arg(long)]
        reuse_snapshot: bool,
    },

    /// Search the index from the command line.
    Search {
        /// Package name or fragment.
        query: String,

        /// Use the local snapshot if present instead of downloading.
        #[arg(long)]
        offline: bool,
    },

    /// Download the snapshot and check that it opens.
    Fetch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_env(&cli.config)
        .with_context(|| format!("no usable configuration ({})", cli.config.display()))?;

    match cli.command {
        Commands::Serve {
            eager,
            reuse_snapshot,
        } => {
            server::run_server(&cfg, eager, reuse_snapshot).await?;
        }
        Commands::Search { query, offline } => {
            search::run_search(&cfg, &query, offline).await?;
        }
        Commands::Fetch => {
            let index = IndexCell::from_config(&cfg)?;
            index.warm().await?;
            println!("Snapshot ready at {}", cfg.snapshot.local_path.display());
        }
    }

    Ok(())
}
