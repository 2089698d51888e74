//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `store_timeout_ms` is less than 10ms or exceeds 5 minutes
    /// - `max_redirects` exceeds 20
    /// - `user_agent` is empty
    /// - `proxy` is set but not an http(s)/socks5 URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.store_timeout_ms < 10 {
            return Err(ConfigError::Invalid {
                field: "store_timeout_ms".into(),
                reason: "must be at least 10ms".into(),
            });
        }
        if self.store_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "store_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_redirects > 20 {
            return Err(ConfigError::Invalid { field: "max_redirects".into(), reason: "must not exceed 20".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if let Some(proxy) = &self.proxy {
            let parsed = url::Url::parse(proxy)
                .map_err(|e| ConfigError::Invalid { field: "proxy".into(), reason: e.to_string() })?;
            if !matches!(parsed.scheme(), "http" | "https" | "socks5") {
                return Err(ConfigError::Invalid {
                    field: "proxy".into(),
                    reason: format!("unsupported scheme {}", parsed.scheme()),
                });
            }
        }

        if !self.verify_tls {
            tracing::warn!("TLS certificate verification is disabled");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_store_timeout() {
        let config = AppConfig { store_timeout_ms: 5, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "store_timeout_ms"));
    }

    #[test]
    fn test_validate_max_redirects() {
        let config = AppConfig { max_redirects: 21, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_redirects"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_proxy() {
        let good = AppConfig { proxy: Some("http://proxy.local:3128".into()), ..Default::default() };
        assert!(good.validate().is_ok());

        let bad = AppConfig { proxy: Some("ftp://proxy.local".into()), ..Default::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid { field, .. }) if field == "proxy"));

        let garbage = AppConfig { proxy: Some("not a url".into()), ..Default::default() };
        assert!(matches!(garbage.validate(), Err(ConfigError::Invalid { field, .. }) if field == "proxy"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { timeout_ms: 100, store_timeout_ms: 10, max_redirects: 0, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
