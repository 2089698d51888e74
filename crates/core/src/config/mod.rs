//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RESCACHE_*)
//! 2. TOML config file (if RESCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RESCACHE_*)
/// 2. TOML config file (if RESCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via RESCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via RESCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Deadline for a single network round trip in milliseconds.
    ///
    /// Set via RESCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Deadline for a single store call in milliseconds.
    ///
    /// Set via RESCACHE_STORE_TIMEOUT_MS environment variable.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Maximum number of redirects to follow.
    ///
    /// Set via RESCACHE_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Proxy URL applied to all outgoing requests.
    ///
    /// Set via RESCACHE_PROXY environment variable.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Whether TLS certificates are verified.
    ///
    /// Set via RESCACHE_VERIFY_TLS environment variable.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./rescache.sqlite")
}

fn default_user_agent() -> String {
    "rescache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_store_timeout_ms() -> u64 {
    5_000
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
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            max_redirects: default_max_redirects(),
            proxy: None,
            verify_tls: true,
        }
    }
}

impl AppConfig {
    /// Network deadline as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Store deadline as Duration.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RESCACHE_`
    /// 2. TOML file from `RESCACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("RESCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RESCACHE_")
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
        assert_eq!(config.db_path, PathBuf::from("./rescache.sqlite"));
        assert_eq!(config.user_agent, "rescache/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.store_timeout_ms, 5_000);
        assert_eq!(config.max_redirects, 5);
        assert!(config.proxy.is_none());
        assert!(config.verify_tls);
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.store_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_load_from_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("rescache.toml", "user_agent = \"from-file/1.0\"\ntimeout_ms = 1000\n")?;
            jail.set_env("RESCACHE_CONFIG_FILE", "rescache.toml");
            jail.set_env("RESCACHE_TIMEOUT_MS", "2500");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.user_agent, "from-file/1.0");
            assert_eq!(config.timeout_ms, 2500);
            assert_eq!(config.store_timeout_ms, 5_000);
            Ok(())
        });
    }
}
