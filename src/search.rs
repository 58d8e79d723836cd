//! `ctrack search <file.json>`: aggregate externally produced match lists.
//!
//! The input file holds the three tier lists as returned by the semantic
//! index:
//!
//! ```json
//! {
//!   "course": [{ "slug": "rust-101", "score": 0.5 }],
//!   "module": [{ "slug": "ownership", "score": 0.9 }],
//!   "lesson": [{ "slug": "borrowing", "score": 0.7, "metadata": { "course_slug": "rust-101" } }]
//! }
//! ```

use anyhow::{Context, Result};
use std::path::Path;

use coursetrack_core::search::{search_courses, SearchRequest};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub fn load_request(path: &Path) -> Result<SearchRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read search input: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid search input: {}", path.display()))
}

pub async fn run_search(config: &Config, input: &Path, limit: Option<usize>) -> Result<()> {
    let req = load_request(input)?;

    let mut params = config.search_params();
    if let Some(limit) = limit {
        if limit == 0 {
            anyhow::bail!("--limit must be >= 1");
        }
        params.final_limit = limit;
    }

    let store = SqliteStore::connect(config).await?;
    let results = search_courses(&store, &req, &params).await?;
    store.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} ({}) {}",
            i + 1,
            r.score,
            r.course_id,
            r.match_type.as_str(),
            r.course_title.as_deref().unwrap_or("(not in catalog)")
        );
    }
    Ok(())
}
