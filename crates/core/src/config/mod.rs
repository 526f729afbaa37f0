//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SWGATE_*)
//! 2. TOML config file (if SWGATE_CONFIG_FILE set)
//! 3. Built-in defaults (including the compiled-in cache version)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::generation::{CACHE_PREFIX, CACHE_VERSION, CacheGeneration, SEED_URLS};
use crate::interceptor::WriteMode;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWGATE_*)
/// 2. TOML config file (if SWGATE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Prefix of every cache generation name.
    ///
    /// Set via SWGATE_CACHE_PREFIX environment variable.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version tag of the current generation. Defaults to the build-time constant.
    ///
    /// Set via SWGATE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Resources pre-warmed at install, relative to `origin` or absolute.
    ///
    /// Set via SWGATE_SEED_URLS environment variable (e.g. `[/a.png,/b.png]`).
    #[serde(default = "default_seed_urls")]
    pub seed_urls: Vec<String>,

    /// Origin relative request and seed URLs are resolved against.
    ///
    /// Set via SWGATE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to the SQLite cache store.
    ///
    /// Set via SWGATE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network fetches.
    ///
    /// Set via SWGATE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    ///
    /// Set via SWGATE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum redirects followed per fetch.
    ///
    /// Set via SWGATE_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Whether asset cache writes run detached from the response.
    ///
    /// Set via SWGATE_DETACHED_ASSET_WRITES environment variable.
    #[serde(default = "default_true")]
    pub detached_asset_writes: bool,
}

fn default_cache_prefix() -> String {
    CACHE_PREFIX.into()
}

fn default_cache_version() -> String {
    CACHE_VERSION.into()
}

fn default_seed_urls() -> Vec<String> {
    SEED_URLS.iter().map(|url| url.to_string()).collect()
}

fn default_origin() -> String {
    "http://localhost:8080/".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swgate-cache.sqlite")
}

fn default_user_agent() -> String {
    "swgate/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            seed_urls: default_seed_urls(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            detached_asset_writes: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The generation this configuration makes current.
    pub fn generation(&self) -> CacheGeneration {
        CacheGeneration::new(&self.cache_prefix, &self.cache_version)
    }

    pub fn asset_write_mode(&self) -> WriteMode {
        if self.detached_asset_writes { WriteMode::Detached } else { WriteMode::Awaited }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SWGATE_`
    /// 2. TOML file from `SWGATE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWGATE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWGATE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache_prefix, "henry-dashboard-");
        assert_eq!(config.cache_version, CACHE_VERSION);
        assert_eq!(config.seed_urls, vec!["/henry-dashboard/assets/henry-avatar.jpg"]);
        assert_eq!(config.origin, "http://localhost:8080/");
        assert_eq!(config.db_path, PathBuf::from("./swgate-cache.sqlite"));
        assert_eq!(config.user_agent, "swgate/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_redirects, 5);
        assert!(config.detached_asset_writes);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_generation_from_config() {
        let config = AppConfig { cache_version: "v1.0.0".into(), ..Default::default() };
        assert_eq!(config.generation().name(), "henry-dashboard-v1.0.0");
    }

    #[test]
    fn test_asset_write_mode() {
        assert_eq!(AppConfig::default().asset_write_mode(), WriteMode::Detached);
        let config = AppConfig { detached_asset_writes: false, ..Default::default() };
        assert_eq!(config.asset_write_mode(), WriteMode::Awaited);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(
            r#"
            cache_version = "v9.9.9"
            seed_urls = []
            origin = "https://dash.example/"
            "#,
        ));
        let config: AppConfig = figment.extract().unwrap();
        assert_eq!(config.cache_version, "v9.9.9");
        assert!(config.seed_urls.is_empty());
        assert_eq!(config.origin, "https://dash.example/");
        assert_eq!(config.cache_prefix, "henry-dashboard-");
    }
}
