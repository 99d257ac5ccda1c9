//! Configuration management for the cache engine
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Cache limits and location
    #[serde(default)]
    pub cache: CacheLimitsConfig,

    /// Background trimming
    #[serde(default)]
    pub trim: TrimConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Cache limits and location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheLimitsConfig {
    /// Directory holding the materialized segment files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Maximum total bytes of cached segments (0 = unbounded)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Maximum number of cached segments (0 = unbounded)
    #[serde(default = "default_max_elements")]
    pub max_elements: u64,
}

/// Background trimming configuration
///
/// The trim pass shrinks the queue toward a fraction of the configured
/// limits so foreground reservations rarely have to evict inline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrimConfig {
    /// Fraction of `max_size_bytes` the trim pass shrinks toward
    #[serde(default = "default_desired_ratio")]
    pub desired_size_ratio: f64,

    /// Fraction of `max_elements` the trim pass shrinks toward
    #[serde(default = "default_desired_ratio")]
    pub desired_elements_ratio: f64,

    /// Maximum candidates collected per trim pass
    #[serde(default = "default_max_candidates_per_pass")]
    pub max_candidates_per_pass: usize,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/filecache")
}
fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}
fn default_max_elements() -> u64 {
    10_000_000
}
fn default_desired_ratio() -> f64 {
    0.9
}
fn default_max_candidates_per_pass() -> usize {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache: CacheLimitsConfig::default(),
            trim: TrimConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for CacheLimitsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_size_bytes: default_max_size_bytes(),
            max_elements: default_max_elements(),
        }
    }
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            desired_size_ratio: default_desired_ratio(),
            desired_elements_ratio: default_desired_ratio(),
            max_candidates_per_pass: default_max_candidates_per_pass(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CacheError::Configuration(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            CacheError::Configuration(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FILECACHE_CACHE_DIR") {
            self.cache.cache_dir = PathBuf::from(dir);
        }
        if let Ok(max_size) = std::env::var("FILECACHE_MAX_SIZE_BYTES") {
            if let Ok(v) = max_size.parse() {
                self.cache.max_size_bytes = v;
            }
        }
        if let Ok(max_elements) = std::env::var("FILECACHE_MAX_ELEMENTS") {
            if let Ok(v) = max_elements.parse() {
                self.cache.max_elements = v;
            }
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.cache_dir.as_os_str().is_empty() {
            return Err(CacheError::Configuration(
                "Cache directory cannot be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.trim.desired_size_ratio) {
            return Err(CacheError::Configuration(format!(
                "Trim size ratio {} must be within [0, 1]",
                self.trim.desired_size_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.trim.desired_elements_ratio) {
            return Err(CacheError::Configuration(format!(
                "Trim elements ratio {} must be within [0, 1]",
                self.trim.desired_elements_ratio
            )));
        }
        if self.trim.max_candidates_per_pass == 0 {
            return Err(CacheError::Configuration(
                "Trim candidate cap must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Size in bytes the background trim pass shrinks toward
    pub fn desired_size_bytes(&self) -> u64 {
        (self.cache.max_size_bytes as f64 * self.trim.desired_size_ratio) as u64
    }

    /// Element count the background trim pass shrinks toward
    pub fn desired_elements(&self) -> u64 {
        (self.cache.max_elements as f64 * self.trim.desired_elements_ratio) as u64
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            CacheError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            CacheError::Configuration(format!("Failed to write config file {}: {}", path, e))
        })
    }
}
