// Cache settings.
// Root directory, TTL, document format, and lock bounds, loadable from a YAML file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// TTL used when the configured TTL is zero.
pub const DEFAULT_TTL_SECS: f64 = 60.0;

/// Longest time a writer waits for another writer's lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Age after which a lock file is considered left behind by a dead writer.
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Encoding of the persisted cache document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown cache format `{other}`")),
        }
    }
}

/// Configuration for a [`Cache`](crate::Cache) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one subdirectory per cache key.
    pub cache_root: PathBuf,

    /// Seconds a written record stays fresh. Zero selects [`DEFAULT_TTL_SECS`].
    pub cache_ttl: f64,

    /// Encoding used when writing (and expected when reading) cache files.
    pub format: Format,

    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub lock_stale_after: Duration,

    /// Log every refill step, not only failures.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            cache_ttl: 0.0,
            format: Format::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
            debug: false,
        }
    }
}

impl Settings {
    /// Settings rooted at `cache_root` with everything else defaulted.
    pub fn with_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    /// Load settings from a YAML file. Missing fields keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| CacheError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let settings = Self::from_yaml(&contents).map_err(|e| CacheError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !settings.cache_ttl.is_finite() {
            return Err(CacheError::Config {
                path: path.to_path_buf(),
                reason: format!("cache_ttl must be a finite number, got {}", settings.cache_ttl),
            });
        }
        Ok(settings)
    }

    fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty file deserializes to unit, not to an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// TTL in seconds with the zero default applied. Negative values pass through.
    pub fn effective_ttl(&self) -> f64 {
        if self.cache_ttl == 0.0 {
            DEFAULT_TTL_SECS
        } else {
            self.cache_ttl
        }
    }
}

/// Platform cache directory for probecache (~/.cache/probecache on Linux).
pub fn default_cache_root() -> PathBuf {
    ProjectDirs::from("", "", "probecache")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("probecache"))
}
