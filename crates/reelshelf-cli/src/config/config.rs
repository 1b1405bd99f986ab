//! `AppConfig` struct and TOML loading.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reelshelf_query::QueryCacheConfig;
use serde::Deserialize;

/// Default minimum interval between TMDB requests.
const DEFAULT_MIN_INTERVAL_MS: u64 = 25;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// TMDB connection settings.
    #[serde(default)]
    pub tmdb: TmdbConfig,
    /// Query cache timings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// TMDB connection settings.
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
pub struct TmdbConfig {
    /// API key. Overridden by `TMDB_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API base URL (default: `https://api.themoviedb.org/3/`).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Response language, e.g. `en-US`.
    #[serde(default)]
    pub language: Option<String>,
    /// Minimum interval between requests in milliseconds (default: 25).
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
}

/// Query cache timings.
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Delay before the automatic retry of a failed fetch, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    /// How long a failure is served before refetching, in milliseconds.
    #[serde(default)]
    pub error_cooldown_ms: Option<u64>,
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}

impl TmdbConfig {
    /// API key from `env` (the `TMDB_API_KEY` value) or the config file.
    ///
    /// Blank values count as unset.
    #[must_use]
    pub fn resolve_api_key(&self, env: Option<String>) -> Option<String> {
        env.filter(|k| !k.trim().is_empty()).or_else(|| {
            self.api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
        })
    }

    /// Minimum interval between requests.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.unwrap_or(DEFAULT_MIN_INTERVAL_MS))
    }
}

impl CacheConfig {
    /// Query cache settings, with defaults for unset values.
    #[must_use]
    pub fn query_config(&self) -> QueryCacheConfig {
        let defaults = QueryCacheConfig::default();
        QueryCacheConfig {
            retry_delay: self
                .retry_delay_ms
                .map_or(defaults.retry_delay, Duration::from_millis),
            error_cooldown: self
                .error_cooldown_ms
                .map_or(defaults.error_cooldown, Duration::from_millis),
        }
    }
}
