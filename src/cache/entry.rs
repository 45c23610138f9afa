//! Cache entry metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::key::CacheKey;

/// One cached asset on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Absolute path of the committed file
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// Content type for a cache key, inferred from its extension
pub fn content_type_for(key: &CacheKey) -> String {
    key.extension()
        .and_then(|ext| mime_guess::from_ext(ext).first_raw())
        .unwrap_or("application/octet-stream")
        .to_string()
}
