//! Main DiskCacheStore implementation

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

use super::utils;
use crate::cache::{content_type_for, CacheConfig, CacheEntry, CacheKey, CacheStoreError};

/// A committed entry opened for reading
#[derive(Debug)]
pub struct OpenedEntry {
    pub entry: CacheEntry,
    pub file: tokio::fs::File,
}

/// Snapshot of store usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub bytes: u64,
    pub max_bytes: u64,
}

/// Flat-directory disk cache.
///
/// Every write streams into `<root>/.tmp/` and is renamed into place only
/// once fully flushed, so a file under its final name is always complete.
/// The store never evicts; `max_size_bytes` only bounds new writes.
///
/// Content types come from the key's extension. When the origin declared a
/// different one, it is kept in `<root>/.meta/<file name>`, committed before
/// the asset itself.
#[derive(Debug)]
pub struct DiskCacheStore {
    root: PathBuf,
    tmp_dir: PathBuf,
    meta_dir: PathBuf,
    max_size_bytes: u64,
    used_bytes: AtomicU64,
}

impl DiskCacheStore {
    /// Open (creating if needed) a cache rooted at `root`.
    ///
    /// Removes scratch files from interrupted writes and measures current
    /// usage so the capacity bound holds across restarts.
    pub async fn new(
        root: impl AsRef<Path>,
        max_size_bytes: u64,
    ) -> Result<Self, CacheStoreError> {
        tokio::fs::create_dir_all(root.as_ref()).await?;
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        let tmp_dir = utils::temp_dir(&root);
        tokio::fs::create_dir_all(&tmp_dir).await?;
        let meta_dir = utils::meta_dir(&root);
        tokio::fs::create_dir_all(&meta_dir).await?;

        let orphans = utils::remove_orphaned_temp_files(&tmp_dir).await?;
        let usage = utils::scan_usage(&root).await?;

        tracing::info!(
            cache_dir = %root.display(),
            entries = usage.files,
            used_bytes = usage.bytes,
            max_size_bytes,
            orphaned_temp_files = orphans,
            "Disk cache store opened"
        );

        Ok(Self {
            root,
            tmp_dir,
            meta_dir,
            max_size_bytes,
            used_bytes: AtomicU64::new(usage.bytes),
        })
    }

    pub async fn from_config(config: &CacheConfig) -> Result<Self, CacheStoreError> {
        Self::new(config.dir_path(), config.max_size_bytes()).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Bytes currently committed or reserved by in-progress writes
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        utils::entry_path(&self.root, key)
    }

    /// Whether a committed file exists for `key`
    pub async fn has(&self, key: &CacheKey) -> bool {
        tokio::fs::metadata(self.path_for(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Metadata of a committed entry
    pub async fn entry(&self, key: &CacheKey) -> Result<CacheEntry, CacheStoreError> {
        let path = self.path_for(key);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(self.build_entry(key, path, &metadata).await),
            Ok(_) => Err(CacheStoreError::NotFound(key.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheStoreError::NotFound(key.clone()))
            }
            Err(e) => Err(CacheStoreError::Io(e)),
        }
    }

    /// Open a committed entry for streaming
    pub async fn open(&self, key: &CacheKey) -> Result<OpenedEntry, CacheStoreError> {
        let path = self.path_for(key);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheStoreError::NotFound(key.clone()))
            }
            Err(e) => return Err(CacheStoreError::Io(e)),
        };
        // Metadata from the handle, not the path: a concurrent replace cannot
        // make size and bytes disagree.
        let metadata = file.metadata().await?;
        let entry = self.build_entry(key, path, &metadata).await;
        Ok(OpenedEntry { entry, file })
    }

    /// Stream `source` into the cache under `key`.
    ///
    /// `content_type` is the type declared by the origin, if any; it wins
    /// over the extension for every later read of the entry.
    ///
    /// On any failure the scratch file is deleted and nothing becomes visible
    /// under `key`. Source errors are reported as `SourceInterrupted`, local
    /// disk problems as `Write` or `StorageFull`.
    pub async fn put<S>(
        &self,
        key: &CacheKey,
        source: S,
        content_type: Option<&str>,
    ) -> Result<CacheEntry, CacheStoreError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send,
    {
        let tmp_path = utils::temp_path(&self.tmp_dir, key);
        let mut reserved = 0u64;

        if let Err(e) = self.write_temp(&tmp_path, source, &mut reserved).await {
            self.discard(&tmp_path, reserved).await;
            return Err(e);
        }

        if let Err(e) = self.record_content_type(key, content_type).await {
            self.discard(&tmp_path, reserved).await;
            return Err(CacheStoreError::Write(e));
        }

        let final_path = self.path_for(key);
        let replaced_bytes = match tokio::fs::metadata(&final_path).await {
            Ok(m) if m.is_file() => m.len(),
            _ => 0,
        };

        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            self.discard(&tmp_path, reserved).await;
            return Err(CacheStoreError::Write(e));
        }
        self.release(replaced_bytes);

        tracing::debug!(
            key = %key,
            size_bytes = reserved,
            "Committed cache entry"
        );

        self.entry(key).await
    }

    /// Delete the entry for `key`. Returns false if it did not exist.
    pub async fn remove(&self, key: &CacheKey) -> Result<bool, CacheStoreError> {
        let path = self.path_for(key);
        let size = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m.len(),
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CacheStoreError::Io(e)),
        };
        let removed = utils::remove_if_exists(&path).await?;
        if removed {
            self.release(size);
        }
        utils::remove_if_exists(&utils::meta_path(&self.meta_dir, key)).await?;
        Ok(removed)
    }

    /// Delete every committed entry. Returns the number of files removed.
    pub async fn clear(&self) -> Result<usize, CacheStoreError> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(dir_entry) = dir.next_entry().await? {
            let metadata = dir_entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            tokio::fs::remove_file(dir_entry.path()).await?;
            self.release(metadata.len());
            removed += 1;
        }
        let mut meta = tokio::fs::read_dir(&self.meta_dir).await?;
        while let Some(dir_entry) = meta.next_entry().await? {
            utils::remove_if_exists(&dir_entry.path()).await?;
        }
        tracing::info!(removed, cache_dir = %self.root.display(), "Cleared disk cache");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<StoreStats, CacheStoreError> {
        let usage = utils::scan_usage(&self.root).await?;
        Ok(StoreStats {
            entries: usage.files,
            bytes: usage.bytes,
            max_bytes: self.max_size_bytes,
        })
    }

    async fn write_temp<S>(
        &self,
        tmp_path: &Path,
        source: S,
        reserved: &mut u64,
    ) -> Result<(), CacheStoreError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send,
    {
        let mut file = tokio::fs::File::create(tmp_path)
            .await
            .map_err(CacheStoreError::Write)?;

        futures::pin_mut!(source);
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(CacheStoreError::SourceInterrupted)?;
            let len = chunk.len() as u64;
            self.reserve(len)?;
            *reserved += len;
            file.write_all(&chunk)
                .await
                .map_err(CacheStoreError::Write)?;
        }

        file.flush().await.map_err(CacheStoreError::Write)?;
        file.sync_all().await.map_err(CacheStoreError::Write)?;
        Ok(())
    }

    fn reserve(&self, bytes: u64) -> Result<(), CacheStoreError> {
        let mut current = self.used_bytes.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.max_size_bytes {
                return Err(CacheStoreError::StorageFull {
                    requested: bytes,
                    available: self.max_size_bytes.saturating_sub(current),
                });
            }
            match self.used_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let _ = self
            .used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    async fn discard(&self, tmp_path: &Path, reserved: u64) {
        self.release(reserved);
        if let Err(e) = tokio::fs::remove_file(tmp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp_path.display(), error = %e, "Failed to remove temp file");
            }
        }
    }

    /// Keep the origin's content type when the extension would not
    /// reproduce it, and drop any sidecar left by an earlier write otherwise
    async fn record_content_type(
        &self,
        key: &CacheKey,
        content_type: Option<&str>,
    ) -> std::io::Result<()> {
        let meta_path = utils::meta_path(&self.meta_dir, key);
        let inferred = content_type_for(key);
        let declared = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty() && *ct != inferred.as_str());

        let Some(declared) = declared else {
            utils::remove_if_exists(&meta_path).await?;
            return Ok(());
        };

        let tmp_path = utils::temp_path(&self.tmp_dir, key);
        let written = match tokio::fs::write(&tmp_path, declared).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &meta_path).await,
            Err(e) => Err(e),
        };
        if written.is_err() {
            let _ = utils::remove_if_exists(&tmp_path).await;
        }
        written
    }

    async fn content_type(&self, key: &CacheKey) -> String {
        match tokio::fs::read_to_string(utils::meta_path(&self.meta_dir, key)).await {
            Ok(declared) if !declared.trim().is_empty() => declared.trim().to_string(),
            _ => content_type_for(key),
        }
    }

    async fn build_entry(
        &self,
        key: &CacheKey,
        path: PathBuf,
        metadata: &std::fs::Metadata,
    ) -> CacheEntry {
        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        CacheEntry {
            key: key.clone(),
            file_path: path,
            size_bytes: metadata.len(),
            content_type: self.content_type(key).await,
            created_at,
        }
    }
}
