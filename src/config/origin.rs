//! Origin (object storage) configuration.
//!
//! Describes where assets live upstream: the Supabase project URL, the
//! public buckets used for videos and images, the per-attempt timeout and
//! the filename families whose stored objects use spaces instead of
//! underscores.

use serde::{Deserialize, Serialize};

use super::retry::RetryConfigYaml;
use crate::constants::{
    DEFAULT_IMAGE_BUCKET, DEFAULT_ORIGIN_TIMEOUT_SECS, DEFAULT_SPACE_SUBSTITUTION_PREFIX,
    DEFAULT_VIDEO_BUCKET,
};

fn default_video_bucket() -> String {
    DEFAULT_VIDEO_BUCKET.to_string()
}

fn default_image_bucket() -> String {
    DEFAULT_IMAGE_BUCKET.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_ORIGIN_TIMEOUT_SECS
}

fn default_space_substitution_prefixes() -> Vec<String> {
    vec![DEFAULT_SPACE_SUBSTITUTION_PREFIX.to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Supabase project URL, e.g. "https://abcd.supabase.co"
    pub base_url: String,
    #[serde(default = "default_video_bucket")]
    pub video_bucket: String,
    #[serde(default = "default_image_bucket")]
    pub image_bucket: String,
    /// Upper bound for a single origin attempt, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Filename prefixes retried with underscores replaced by spaces
    #[serde(default = "default_space_substitution_prefixes")]
    pub space_substitution_prefixes: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfigYaml,
}

impl OriginConfig {
    /// Create an origin config with defaults for everything but the URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            video_bucket: default_video_bucket(),
            image_bucket: default_image_bucket(),
            timeout_seconds: default_timeout_seconds(),
            space_substitution_prefixes: default_space_substitution_prefixes(),
            retry: RetryConfigYaml::default(),
        }
    }

    /// Host portion of `base_url`, used for the `X-Origin` diagnostic header
    pub fn host(&self) -> String {
        let without_scheme = self
            .base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        without_scheme
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "origin.base_url '{}' must start with http:// or https://",
                self.base_url
            ));
        }
        if self.video_bucket.trim().is_empty() || self.image_bucket.trim().is_empty() {
            return Err("origin bucket names cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("origin.timeout_seconds must be > 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("origin.retry.max_attempts must be >= 1".to_string());
        }
        if self
            .space_substitution_prefixes
            .iter()
            .any(|p| p.is_empty())
        {
            return Err("origin.space_substitution_prefixes cannot contain empty prefixes".to_string());
        }
        Ok(())
    }
}
