//! Configuration validation rules.
//!
//! Validation runs after `AppConfig` has been loaded from environment, files,
//! or defaults.

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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_prefix` or `version` is empty
    /// - `origin` is not http(s)
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - an API prefix, `primary_endpoint` or sync resource is not an absolute path
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_prefix.is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.version.is_empty() {
            return Err(invalid("version", "must not be empty"));
        }

        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", self.origin.scheme())));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if let Some(prefix) = self.api_prefixes.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("api_prefixes", format!("{prefix:?} must start with '/'")));
        }

        if !self.primary_endpoint.starts_with('/') {
            return Err(invalid("primary_endpoint", "must start with '/'"));
        }

        if let Some((tag, _)) = self.sync_resources.iter().find(|(_, r)| !r.starts_with('/')) {
            return Err(invalid("sync_resources", format!("resource for {tag:?} must start with '/'")));
        }

        if self.precache.is_empty() {
            tracing::warn!("precache manifest is empty; install will only create the stores");
        }

        Ok(())
    }
}
