//! Cache store error types

use thiserror::Error;

use super::key::CacheKey;

#[derive(Debug, Error)]
pub enum CacheStoreError {
    /// No committed file for this key
    #[error("Cache entry not found: {0}")]
    NotFound(CacheKey),

    /// Disk write or rename failed (disk full, permissions, ...)
    #[error("Cache write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Committing the entry would exceed the configured capacity
    #[error("Cache storage is full: {requested} bytes requested, {available} bytes available")]
    StorageFull { requested: u64, available: u64 },

    /// The source stream failed before all bytes were written
    #[error("Source stream interrupted: {0}")]
    SourceInterrupted(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheStoreError {
    /// Local write failures: the asset can still be served uncached
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            CacheStoreError::Write(_) | CacheStoreError::StorageFull { .. }
        )
    }
}
