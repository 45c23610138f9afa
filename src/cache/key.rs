//! Content-addressed cache keys
//!
//! A `CacheKey` is the SHA-256 of `namespace/logical_filename` plus the
//! lower-cased extension of the logical filename. The key is always derived
//! from the filename exactly as received: origin-side spelling fixes
//! (underscores vs spaces, percent-encoding) never leak into cache identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Longest extension kept on cache file names
const MAX_EXTENSION_LEN: usize = 8;

/// Cache key for identifying cached assets
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Hex-encoded SHA-256 digest
    digest: String,
    /// Lower-cased extension of the logical filename, without the dot
    extension: Option<String>,
}

impl CacheKey {
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// File name of this entry inside the flat cache directory
    pub fn file_name(&self) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{}", self.digest, ext),
            None => self.digest.clone(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Maps logical filenames to cache keys within one origin namespace.
///
/// The namespace is the origin bucket, so `intro.mp4` in the video bucket and
/// `intro.mp4` in the image bucket address different entries.
#[derive(Debug, Clone)]
pub struct ContentAddressResolver {
    namespace: String,
}

impl ContentAddressResolver {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Derive the cache key for a logical filename. Never fails.
    pub fn resolve(&self, logical_filename: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(b"/");
        hasher.update(logical_filename.as_bytes());

        CacheKey {
            digest: hex::encode(hasher.finalize()),
            extension: extension_of(logical_filename),
        }
    }
}

/// Extension of the last path component, if it looks like a real one.
fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_deterministic() {
        let resolver = ContentAddressResolver::new("videos");
        for name in [
            "",
            "demo.mp4",
            "gallery_Our_vitamin_sea_rework_2_compressed.mp4",
            "gallery Our vitamin sea.mp4",
            "café (final).webm",
        ] {
            assert_eq!(resolver.resolve(name), resolver.resolve(name));
        }
    }

    #[test]
    fn test_resolve_is_stable_across_instances() {
        let a = ContentAddressResolver::new("videos").resolve("demo.mp4");
        let b = ContentAddressResolver::new("videos").resolve("demo.mp4");
        assert_eq!(a, b);
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_underscore_and_space_variants_are_distinct_keys() {
        let resolver = ContentAddressResolver::new("videos");
        let underscored = resolver.resolve("gallery_x_y.mp4");
        let spaced = resolver.resolve("gallery x y.mp4");
        assert_ne!(underscored, spaced);
    }

    #[test]
    fn test_namespace_separates_keys() {
        let videos = ContentAddressResolver::new("videos").resolve("intro.mp4");
        let images = ContentAddressResolver::new("images").resolve("intro.mp4");
        assert_ne!(videos.digest(), images.digest());
    }

    #[test]
    fn test_empty_filename_still_resolves() {
        let key = ContentAddressResolver::new("videos").resolve("");
        assert_eq!(key.digest().len(), 64);
        assert_eq!(key.extension(), None);
        assert_eq!(key.file_name(), key.digest());
    }

    #[test]
    fn test_extension_is_lowercased_and_kept_in_file_name() {
        let key = ContentAddressResolver::new("videos").resolve("Clip.MP4");
        assert_eq!(key.extension(), Some("mp4"));
        assert_eq!(key.file_name(), format!("{}.mp4", key.digest()));
    }

    #[test]
    fn test_extension_rules() {
        assert_eq!(extension_of("a/b/c.webm"), Some("webm".to_string()));
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of("weird.m p4"), None);
        assert_eq!(extension_of("dir.v2/file"), None);
        assert_eq!(extension_of("long.abcdefghijk"), None);
    }
}
