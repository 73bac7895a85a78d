//! Error taxonomy for the search service.
//!
//! Every failure a request can hit falls into one of four buckets. Each
//! bucket maps to an HTTP status and a machine-readable code used in the
//! JSON error body served by [`crate::server`].

use axum::http::StatusCode;
use thiserror::Error;

/// Errors produced while fetching, opening, or querying the package index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Missing or invalid client input.
    #[error("{0}")]
    Validation(String),

    /// The remote snapshot could not be copied to local storage.
    #[error("snapshot fetch failed: {0}")]
    Fetch(String),

    /// The local snapshot is absent, corrupt, or not a package index.
    #[error("index open failed: {0}")]
    Open(String),

    /// The storage layer failed while running a search, including lock-wait
    /// and connection-acquire timeouts.
    #[error("query error: {0}")]
    Query(String),
}

impl SearchError {
    /// HTTP status code surfaced to clients for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Fetch(_) | Self::Open(_) | Self::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_request",
            Self::Fetch(_) => "fetch_failed",
            Self::Open(_) => "open_failed",
            Self::Query(_) => "query_failed",
        }
    }
}

impl From<sqlx::Error> for SearchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                Self::Query("timed out waiting for the index connection".to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

/// Shorthand for results carrying a [`SearchError`].
pub type SearchResult<T> = std::result::Result<T, SearchError>;
