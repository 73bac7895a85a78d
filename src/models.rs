//! Data types read from the package index and served over HTTP.

use serde::{Deserialize, Serialize};

/// A package row from the `packages` table.
///
/// The index is produced elsewhere; this service only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
}

/// Body of a successful `GET /search` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<Package>,
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
