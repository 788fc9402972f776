//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (UPGUARD_*)
//! 2. TOML config file (if UPGUARD_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Blocking schedule of an auto-blocking HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoBlockConfig {
    /// First (and second) block duration; later blocks follow the Fibonacci sequence.
    pub initial: Duration,
    /// Optional ceiling for a single block.
    pub max: Option<Duration>,
}

impl Default for AutoBlockConfig {
    fn default() -> Self {
        Self { initial: Duration::from_secs(default_auto_block_initial_secs()), max: None }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (UPGUARD_*)
/// 2. TOML config file (if UPGUARD_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Manually block all requests to the remote.
    ///
    /// Set via UPGUARD_BLOCKED environment variable.
    #[serde(default)]
    pub blocked: bool,

    /// Automatically block the remote after it becomes unreachable.
    ///
    /// Set via UPGUARD_AUTO_BLOCK environment variable.
    #[serde(default = "default_true")]
    pub auto_block: bool,

    /// Whether the repository is online.
    ///
    /// Set via UPGUARD_ONLINE environment variable.
    #[serde(default = "default_true")]
    pub online: bool,

    /// Length of the first auto-block, in seconds.
    ///
    /// Set via UPGUARD_AUTO_BLOCK_INITIAL_SECS environment variable.
    #[serde(default = "default_auto_block_initial_secs")]
    pub auto_block_initial_secs: u64,

    /// Longest single auto-block, in seconds. Unbounded when unset.
    ///
    /// Set via UPGUARD_AUTO_BLOCK_MAX_SECS environment variable.
    #[serde(default)]
    pub auto_block_max_secs: Option<u64>,

    /// Maximum age of cached content in seconds; negative never expires.
    ///
    /// Set via UPGUARD_CONTENT_MAX_AGE_SECS environment variable.
    #[serde(default = "default_max_age_secs")]
    pub content_max_age_secs: i64,

    /// Maximum age of cached metadata in seconds; negative never expires.
    ///
    /// Set via UPGUARD_METADATA_MAX_AGE_SECS environment variable.
    #[serde(default = "default_max_age_secs")]
    pub metadata_max_age_secs: i64,

    /// Whether "not found" responses are cached.
    ///
    /// Set via UPGUARD_NEGATIVE_CACHE_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub negative_cache_enabled: bool,

    /// How long a "not found" response is remembered, in seconds.
    ///
    /// Set via UPGUARD_NEGATIVE_CACHE_TTL_SECS environment variable.
    #[serde(default = "default_negative_cache_ttl_secs")]
    pub negative_cache_ttl_secs: u64,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via UPGUARD_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via UPGUARD_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects to follow.
    ///
    /// Set via UPGUARD_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Capacity of the cluster event channel.
    ///
    /// A node whose listener falls further behind than this skips the
    /// oldest events and logs the gap, so size it above the burst of
    /// invalidations and status changes the cluster can produce.
    ///
    /// Set via UPGUARD_EVENT_CAPACITY environment variable.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_auto_block_initial_secs() -> u64 {
    40
}

fn default_max_age_secs() -> i64 {
    24 * 60 * 60
}

fn default_negative_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_user_agent() -> String {
    "upguard/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            blocked: false,
            auto_block: true,
            online: true,
            auto_block_initial_secs: default_auto_block_initial_secs(),
            auto_block_max_secs: None,
            content_max_age_secs: default_max_age_secs(),
            metadata_max_age_secs: default_max_age_secs(),
            negative_cache_enabled: true,
            negative_cache_ttl_secs: default_negative_cache_ttl_secs(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn auto_block(&self) -> AutoBlockConfig {
        AutoBlockConfig {
            initial: Duration::from_secs(self.auto_block_initial_secs),
            max: self.auto_block_max_secs.map(Duration::from_secs),
        }
    }

    pub fn content_max_age(&self) -> Option<Duration> {
        max_age(self.content_max_age_secs)
    }

    pub fn metadata_max_age(&self) -> Option<Duration> {
        max_age(self.metadata_max_age_secs)
    }

    /// Negative cache TTL, or `None` when the negative cache is disabled.
    pub fn negative_cache_ttl(&self) -> Option<Duration> {
        self.negative_cache_enabled
            .then(|| Duration::from_secs(self.negative_cache_ttl_secs))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `UPGUARD_`
    /// 2. TOML file from `UPGUARD_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("UPGUARD_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("UPGUARD_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

fn max_age(secs: i64) -> Option<Duration> {
    u64::try_from(secs).ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.blocked);
        assert!(config.auto_block);
        assert!(config.online);
        assert_eq!(config.auto_block_initial_secs, 40);
        assert!(config.auto_block_max_secs.is_none());
        assert_eq!(config.content_max_age_secs, 86_400);
        assert_eq!(config.user_agent, "upguard/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_auto_block_config() {
        let config = AppConfig { auto_block_max_secs: Some(600), ..Default::default() };
        let auto_block = config.auto_block();
        assert_eq!(auto_block.initial, Duration::from_secs(40));
        assert_eq!(auto_block.max, Some(Duration::from_secs(600)));
        assert_eq!(AppConfig::default().auto_block(), AutoBlockConfig::default());
    }

    #[test]
    fn test_max_ages() {
        let config = AppConfig { content_max_age_secs: -1, metadata_max_age_secs: 60, ..Default::default() };
        assert_eq!(config.content_max_age(), None);
        assert_eq!(config.metadata_max_age(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_negative_cache_ttl() {
        assert_eq!(AppConfig::default().negative_cache_ttl(), Some(Duration::from_secs(86_400)));
        let disabled = AppConfig { negative_cache_enabled: false, ..Default::default() };
        assert_eq!(disabled.negative_cache_ttl(), None);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_load_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("UPGUARD_BLOCKED", "true");
            jail.set_env("UPGUARD_AUTO_BLOCK_INITIAL_SECS", "10");
            jail.set_env("UPGUARD_USER_AGENT", "upguard-test");

            let config = AppConfig::load().expect("config should load");
            assert!(config.blocked);
            assert_eq!(config.auto_block_initial_secs, 10);
            assert_eq!(config.user_agent, "upguard-test");
            assert!(config.online);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("upguard.toml", "auto_block = false\ntimeout_ms = 5000\n")?;
            jail.set_env("UPGUARD_CONFIG_FILE", "upguard.toml");
            jail.set_env("UPGUARD_TIMEOUT_MS", "7000");

            let config = AppConfig::load().expect("config should load");
            assert!(!config.auto_block);
            assert_eq!(config.timeout_ms, 7000);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("UPGUARD_AUTO_BLOCK_INITIAL_SECS", "0");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}
