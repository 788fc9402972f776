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

impl ConfigError {
    fn invalid(field: &str, reason: &str) -> Self {
        ConfigError::Invalid { field: field.into(), reason: reason.into() }
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `auto_block_initial_secs` is 0
    /// - `auto_block_max_secs` is lower than `auto_block_initial_secs`
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `event_capacity` is 0
    /// - `negative_cache_ttl_secs` is 0 while the negative cache is enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auto_block_initial_secs == 0 {
            return Err(ConfigError::invalid("auto_block_initial_secs", "must be greater than 0"));
        }
        if let Some(max) = self.auto_block_max_secs
            && max < self.auto_block_initial_secs
        {
            return Err(ConfigError::invalid("auto_block_max_secs", "must not be lower than auto_block_initial_secs"));
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be greater than 0"));
        }

        if self.negative_cache_enabled && self.negative_cache_ttl_secs == 0 {
            return Err(ConfigError::invalid("negative_cache_ttl_secs", "must be greater than 0 when enabled"));
        }

        if self.blocked && self.auto_block {
            tracing::warn!(
                blocked = self.blocked,
                auto_block = self.auto_block,
                "Both blocked and auto_block are set; \
                 manual block takes precedence"
            );
        }

        Ok(())
    }
}
