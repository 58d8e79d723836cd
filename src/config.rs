//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/ctrack.sqlite"
//!
//! [progress]
//! empty_course = "guard"
//!
//! [search]
//! final_limit = 20
//! min_score = 0.0
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```
//!
//! `[progress]` and `[search]` may be omitted.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use coursetrack_core::progress::{EmptyCoursePolicy, ProgressTracker};
use coursetrack_core::search::SearchParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProgressConfig {
    #[serde(default)]
    pub empty_course: EmptyCoursePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default)]
    pub min_score: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            min_score: 0.0,
        }
    }
}

fn default_final_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// Defaults for tests and ad-hoc tooling: a relative database path and
    /// the standard bind address.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/ctrack.sqlite"),
            },
            progress: ProgressConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:7340".to_string(),
            },
        }
    }

    pub fn tracker(&self) -> ProgressTracker {
        ProgressTracker::new(self.progress.empty_course)
    }

    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            final_limit: self.search.final_limit,
            min_score: self.search.min_score,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.search.final_limit < 1 {
        anyhow::bail!("search.final_limit must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.search.min_score) {
        anyhow::bail!("search.min_score must be in [0.0, 1.0]");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(config)
}
