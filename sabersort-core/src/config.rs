//! Sort run configuration
//!
//! Loaded from a TOML file where every section and key is optional, then
//! overridden from environment variables:
//!
//! | variable               | key                  |
//! |------------------------|----------------------|
//! | `SABERSORT_THRESHOLD`  | `sort.threshold`     |
//! | `SABERSORT_WORKERS`    | `sort.workers`       |
//! | `SABERSORT_USER_AGENT` | `sort.user_agent`    |
//! | `PIXIV_PHPSESSID`      | `pixiv.phpsessid`    |
//! | `TWITTER_API_URL`      | `twitter.api_url`    |

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::candidate::{Origin, SearchPolicy, SortOrder};
use crate::engine::{MatchPolicy, DEFAULT_THRESHOLD};
use crate::error::{Result, SaberError};
use crate::formatter::{FilenameFormat, DEFAULT_TEMPLATE};
use crate::hasher::{HashAlgorithm, PerceptualHasher, DEFAULT_HASH_SIZE};
use crate::origin::{HttpConfig, PixivConfig, TwitterConfig};

/// Complete configuration of a sort run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sort: SortConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub pixiv: PixivConfig,
    pub twitter: TwitterConfig,
    pub http: HttpConfig,
}

/// Directories, naming and matching tolerance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Images to sort
    pub input_dir: PathBuf,
    /// Resolved full-resolution images
    pub found_dir: PathBuf,
    /// Inputs with no matching candidate, copied unchanged
    pub not_found_dir: PathBuf,
    /// Inputs whose matched post is gone or has no matching page
    pub except_dir: PathBuf,
    /// File name template (see [`crate::formatter`])
    pub filename: String,
    /// Maximum hash distance still counted as a match
    pub threshold: u32,
    /// Images processed concurrently
    pub workers: usize,
    pub user_agent: Option<String>,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            found_dir: PathBuf::from("found"),
            not_found_dir: PathBuf::from("not_found"),
            except_dir: PathBuf::from("except"),
            filename: DEFAULT_TEMPLATE.to_string(),
            threshold: DEFAULT_THRESHOLD,
            workers: 3,
            user_agent: None,
        }
    }
}

/// Record store location and the hasher its keys come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub database_path: PathBuf,
    /// Prune stale records before sorting
    pub check_on_start: bool,
    /// While pruning, also re-hash files that still exist
    pub check_hash: bool,
    pub hash_algorithm: HashAlgorithm,
    pub hash_size: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("saberdb.db"),
            check_on_start: false,
            check_hash: false,
            hash_algorithm: HashAlgorithm::default(),
            hash_size: DEFAULT_HASH_SIZE,
        }
    }
}

/// Ranking of search results.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub preferred_origin: Origin,
    pub sort_order: SortOrder,
    /// Keep only the first N results; 0 keeps all
    pub first: usize,
    /// Thumbnails probed at most per image
    pub max_probes: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            preferred_origin: Origin::Pixiv,
            sort_order: SortOrder::No,
            first: 0,
            max_probes: None,
        }
    }
}

impl Config {
    /// Load from a TOML file and apply environment overrides.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            SaberError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides();
        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SaberError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Override values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Unparseable numbers keep the configured value.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(threshold) = var("SABERSORT_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.sort.threshold = threshold;
        }
        if let Some(workers) = var("SABERSORT_WORKERS").and_then(|v| v.parse().ok()) {
            self.sort.workers = workers;
        }
        if let Some(agent) = var("SABERSORT_USER_AGENT").filter(|v| !v.is_empty()) {
            self.sort.user_agent = Some(agent);
        }
        if let Some(session) = var("PIXIV_PHPSESSID").filter(|v| !v.is_empty()) {
            self.pixiv.phpsessid = Some(session);
        }
        if let Some(url) = var("TWITTER_API_URL").filter(|v| !v.is_empty()) {
            self.twitter.api_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dirs = [
            ("sort.input_dir", &self.sort.input_dir),
            ("sort.found_dir", &self.sort.found_dir),
            ("sort.not_found_dir", &self.sort.not_found_dir),
            ("sort.except_dir", &self.sort.except_dir),
            ("index.database_path", &self.index.database_path),
        ];
        for (key, path) in dirs {
            if path.as_os_str().is_empty() {
                return Err(SaberError::Config(format!("{key} must not be empty")));
            }
        }
        if self.sort.workers == 0 {
            return Err(SaberError::Config("sort.workers must be at least 1".into()));
        }
        if self.search.max_probes == Some(0) {
            return Err(SaberError::Config("search.max_probes must be at least 1".into()));
        }
        if self.index.hash_size == 0 {
            return Err(SaberError::Config("index.hash_size must be at least 1".into()));
        }
        self.filename_format()?;
        Ok(())
    }

    pub fn hasher(&self) -> PerceptualHasher {
        PerceptualHasher::new(self.index.hash_algorithm, self.index.hash_size)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            threshold: self.sort.threshold,
            max_probes: self.search.max_probes,
            search: SearchPolicy {
                preferred: self.search.preferred_origin,
                sort_order: self.search.sort_order,
                first: self.search.first,
            },
        }
    }

    pub fn filename_format(&self) -> Result<FilenameFormat> {
        FilenameFormat::parse(&self.sort.filename)
    }

    /// HTTP settings, with `sort.user_agent` filling in an unset agent.
    pub fn http_config(&self) -> HttpConfig {
        let mut http = self.http.clone();
        if http.user_agent.is_none() {
            http.user_agent = self.sort.user_agent.clone();
        }
        http
    }
}
