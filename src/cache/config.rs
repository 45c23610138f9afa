//! Local cache store configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CACHE_CONTROL_MAX_AGE_SECS, DEFAULT_CACHE_DIR, DEFAULT_MAX_CACHE_SIZE_MB,
};

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_max_size_mb() -> u64 {
    DEFAULT_MAX_CACHE_SIZE_MB
}

fn default_cache_control_max_age_seconds() -> u64 {
    DEFAULT_CACHE_CONTROL_MAX_AGE_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Flat directory holding one file per cached asset
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Capacity bound; puts that would exceed it are served uncached
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    /// `Cache-Control: public, max-age=N` sent with asset responses
    #[serde(default = "default_cache_control_max_age_seconds")]
    pub cache_control_max_age_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size_mb: default_max_size_mb(),
            cache_control_max_age_seconds: default_cache_control_max_age_seconds(),
        }
    }
}

impl CacheConfig {
    /// Convert max_size_mb to bytes
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }

    /// Validate cache configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.dir.trim().is_empty() {
            return Err("cache.dir cannot be empty".to_string());
        }
        if self.max_size_mb == 0 {
            return Err("cache.max_size_mb must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let config: CacheConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.dir, DEFAULT_CACHE_DIR);
        assert_eq!(config.max_size_mb, DEFAULT_MAX_CACHE_SIZE_MB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_size_bytes_conversion() {
        let config = CacheConfig {
            max_size_mb: 3,
            ..CacheConfig::default()
        };
        assert_eq!(config.max_size_bytes(), 3 * 1024 * 1024);
    }

    #[test]
    fn test_cache_config_rejects_empty_dir() {
        let config = CacheConfig {
            dir: "  ".to_string(),
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_config_rejects_zero_capacity() {
        let config = CacheConfig {
            max_size_mb: 0,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
