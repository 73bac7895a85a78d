//! HTTP front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | any | `/` | Health check, never touches the index |
//! | any | `/search?q=<query>` | Ranked package search |
//! | any | other | `404` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing query ?q=" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `fetch_failed` (500),
//! `open_failed` (500), `query_failed` (500).

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::SearchError;
use crate::index::IndexCell;
use crate::models::{HealthResponse, SearchResponse};
use crate::search::{search_packages, validate_query};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<IndexCell>,
}

impl AppState {
    pub fn new(index: IndexCell) -> Self {
        Self {
            index: Arc::new(index),
        }
    }
}

/// Build the router. Separate from [`run_server`] so tests can drive it
/// without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", any(handle_health))
        .route("/search", any(handle_search))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start serving on `[server].bind` until Ctrl-C.
///
/// With `eager`, the index is initialized before the listener opens. A
/// failure there is logged and left for the first search to retry.
pub async fn run_server(
    config: &Config,
    eager: bool,
    reuse_snapshot: bool,
) -> anyhow::Result<()> {
    let index = IndexCell::from_config(config)?.reuse_existing(reuse_snapshot);
    if eager {
        if let Err(e) = index.warm().await {
            warn!(error = %e, "eager index initialization failed; will retry on first search");
        }
    }

    let app = router(AppState::new(index));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        AppError {
            status: err.status_code(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Handlers ============

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// First value of `q`, so `?q=curl&q=lib` searches for `curl`.
fn first_q(pairs: Vec<(String, String)>) -> String {
    pairs
        .into_iter()
        .find(|(k, _)| k == "q")
        .map(|(_, v)| v)
        .unwrap_or_default()
}

/// Handler for `/search`.
///
/// The query is validated before the index is touched, so an empty `q` is a
/// `400` even while the index is unavailable.
async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Query(pairs) = params.map_err(|e| AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: e.body_text(),
    })?;
    let q = first_q(pairs);
    validate_query(&q)?;

    let pool = state.index.get().await?;
    let results = search_packages(pool, &q).await.map_err(|e| {
        warn!(query = %q, error = %e, "search failed");
        e
    })?;

    Ok(Json(SearchResponse { results }))
}

async fn handle_not_found() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: "not found".to_string(),
    }
}
