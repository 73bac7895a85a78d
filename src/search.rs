//! Ranked package-name search.
//!
//! Every package whose name contains the query is placed in exactly one tier:
//!
//! | Rank | Match |
//! |------|-------|
//! | 1 | name equals the query |
//! | 2 | name starts with the query |
//! | 3 | name contains the query elsewhere |
//!
//! Results are ordered by rank, then name, then version, and capped at
//! [`RESULT_LIMIT`]. Each `(name, version)` pair appears once, under its best
//! tier. Distinct versions of one package are distinct results.
//!
//! Matching is case-sensitive and literal: `%` and `_` in the query match
//! only themselves. Comparisons use `instr`/`substr` rather than `LIKE`, which
//! would fold ASCII case and treat those characters as wildcards.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::error::{SearchError, SearchResult};
use crate::index::IndexCell;
use crate::models::Package;

/// Maximum number of rows a search returns.
pub const RESULT_LIMIT: i64 = 50;

const RANKED_QUERY: &str = r#"
    SELECT name, version,
           CASE
               WHEN name = ?1 THEN 1
               WHEN substr(name, 1, length(?1)) = ?1 THEN 2
               ELSE 3
           END AS rank
    FROM packages
    WHERE instr(name, ?1) > 0
    GROUP BY name, version
    ORDER BY rank, name, version
    LIMIT ?2
"#;

/// Reject an empty query. Whitespace is a legal substring.
pub fn validate_query(q: &str) -> SearchResult<()> {
    if q.is_empty() {
        return Err(SearchError::Validation("missing query ?q=".to_string()));
    }
    Ok(())
}

/// Run the ranked query for `q` against an open index.
pub async fn search_packages(pool: &SqlitePool, q: &str) -> SearchResult<Vec<Package>> {
    validate_query(q)?;

    let rows = sqlx::query(RANKED_QUERY)
        .bind(q)
        .bind(RESULT_LIMIT)
        .fetch_all(pool)
        .await?;

    let results = rows
        .iter()
        .map(|row| Package {
            name: row.get::<Option<String>, _>("name").unwrap_or_default(),
            version: row.get::<Option<String>, _>("version").unwrap_or_default(),
        })
        .collect();

    Ok(results)
}

/// `rippkgs-search search <query>`: fetch (or reuse) the snapshot and print
/// matches one per line. An empty query fails before anything is fetched.
pub async fn run_search(config: &Config, query: &str, offline: bool) -> Result<()> {
    validate_query(query)?;

    let index = IndexCell::from_config(config)?.reuse_existing(offline);
    let pool = index.get().await?;
    let results = search_packages(pool, query).await?;

    if results.is_empty() {
        println!("No results.");
    } else {
        let width = results.iter().map(|p| p.name.len()).max().unwrap_or(0);
        for p in &results {
            println!("{:<width$}  {}", p.name, p.version, width = width);
        }
    }

    pool.close().await;
    Ok(())
}
