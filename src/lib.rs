//! # rippkgs-search
//!
//! A small HTTP service answering ranked substring searches over a package
//! index. The index is a read-only SQLite snapshot built elsewhere; the
//! service downloads it from object storage on first use and keeps it open
//! for the life of the process.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │  Router  │──▶│ IndexCell │──▶│ Snapshot  │──▶│ S3 / file│
//! │ (axum)   │   │ (lazy)    │   │  fetcher  │   └──────────┘
//! └────┬─────┘   └─────┬─────┘   └───────────┘
//!      │               ▼
//!      │         ┌───────────┐
//!      └────────▶│  Ranked   │  exact ▸ prefix ▸ substring
//!                │  search   │
//!                └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Error taxonomy and HTTP status mapping |
//! | [`models`] | Package record and response bodies |
//! | [`sigv4`] | AWS SigV4 signing |
//! | [`snapshot`] | Snapshot sources (S3, local file) |
//! | [`db`] | Read-only index opening |
//! | [`index`] | Lazy, retryable index initialization |
//! | [`search`] | Ranked search query |
//! | [`server`] | HTTP router |

pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod server;
pub mod sigv4;
pub mod snapshot;
