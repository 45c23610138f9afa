//! Utility functions for the disk cache

use std::path::{Path, PathBuf};

use crate::cache::CacheKey;
use crate::constants::{META_DIR_NAME, TEMP_DIR_NAME};

/// Path of the committed file for a key
pub fn entry_path(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(key.file_name())
}

/// Unique scratch path for an in-progress write of `key`
pub fn temp_path(tmp_dir: &Path, key: &CacheKey) -> PathBuf {
    tmp_dir.join(format!("{}.{}.tmp", key.digest(), uuid::Uuid::new_v4()))
}

/// Scratch directory for in-progress writes. Lives inside the cache root so
/// the final rename never crosses a filesystem boundary.
pub fn temp_dir(root: &Path) -> PathBuf {
    root.join(TEMP_DIR_NAME)
}

/// Directory of content-type sidecars
pub fn meta_dir(root: &Path) -> PathBuf {
    root.join(META_DIR_NAME)
}

/// Content-type sidecar for a key
pub fn meta_path(meta_dir: &Path, key: &CacheKey) -> PathBuf {
    meta_dir.join(key.file_name())
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Totals for the committed files directly under `root`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirUsage {
    pub files: usize,
    pub bytes: u64,
}

/// Sum sizes of committed entries (regular files in the flat root)
pub async fn scan_usage(root: &Path) -> std::io::Result<DirUsage> {
    let mut usage = DirUsage::default();
    let mut dir = tokio::fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            usage.files += 1;
            usage.bytes += metadata.len();
        }
    }
    Ok(usage)
}

/// Delete scratch files left behind by interrupted writes.
/// Returns the number of files removed.
pub async fn remove_orphaned_temp_files(tmp_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut dir = tokio::fs::read_dir(tmp_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if entry.metadata().await?.is_file() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned temp file")
                }
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentAddressResolver;

    #[test]
    fn test_entry_path_is_flat() {
        let key = ContentAddressResolver::new("videos").resolve("nested/dir/demo.mp4");
        let path = entry_path(Path::new("/cache"), &key);
        assert_eq!(path.parent(), Some(Path::new("/cache")));
        assert!(path.to_string_lossy().ends_with(".mp4"));
    }

    #[test]
    fn test_temp_paths_are_unique_per_write() {
        let key = ContentAddressResolver::new("videos").resolve("demo.mp4");
        let tmp = temp_dir(Path::new("/cache"));
        assert_ne!(temp_path(&tmp, &key), temp_path(&tmp, &key));
        assert!(temp_path(&tmp, &key).starts_with("/cache/.tmp"));
    }

    #[tokio::test]
    async fn test_scan_usage_ignores_directories() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.mp4"), vec![0u8; 10])
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("b"), vec![0u8; 5])
            .await
            .unwrap();
        tokio::fs::create_dir(dir.path().join(".tmp")).await.unwrap();
        tokio::fs::write(dir.path().join(".tmp").join("x.tmp"), vec![0u8; 99])
            .await
            .unwrap();

        let usage = scan_usage(dir.path()).await.unwrap();
        assert_eq!(usage, DirUsage { files: 2, bytes: 15 });
    }
}
