// Download coordination
//
// Deduplicates concurrent origin downloads for the same cache key.
// When multiple clients request an uncached asset simultaneously:
// - First request: spawns the download task and subscribes to its outcome
// - Subsequent requests: subscribe to the same outcome
// - All requests: receive the same entry or the same error
//
// The download runs on its own task, so a client that disconnects never
// cancels the fetch other waiters depend on. The in-flight entry is removed
// before the outcome is published; a request arriving afterwards starts a
// fresh attempt (or finds the committed file).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

use crate::cache::{CacheEntry, CacheKey, CacheStoreError, DiskCacheStore};
use crate::metrics::Metrics;
use crate::origin::{OriginError, OriginFetcher};

/// Outcome slot shared by every waiter on one key
type Outcome = Option<Result<CacheEntry, DownloadError>>;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Origin(#[from] OriginError),

    /// The local store could not take the asset; the origin itself is fine
    #[error("cache write failed: {0}")]
    Write(String),

    /// The download task ended without publishing an outcome
    #[error("download aborted before completion")]
    Aborted,
}

impl DownloadError {
    pub fn is_write_failure(&self) -> bool {
        matches!(self, DownloadError::Write(_))
    }

    /// Label used for the origin fetch outcome metric
    pub fn outcome_label(&self) -> &'static str {
        match self {
            DownloadError::Origin(err) => err.kind.as_str(),
            DownloadError::Write(_) => "write_failed",
            DownloadError::Aborted => "aborted",
        }
    }
}

/// Single-flight download coordinator
#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<DiskCacheStore>,
    fetcher: Arc<OriginFetcher>,
    metrics: Arc<Metrics>,
    in_flight: Mutex<HashMap<CacheKey, watch::Sender<Outcome>>>,
}

impl DownloadCoordinator {
    pub fn new(
        store: Arc<DiskCacheStore>,
        fetcher: Arc<OriginFetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                metrics,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn fetcher(&self) -> &Arc<OriginFetcher> {
        &self.inner.fetcher
    }

    pub fn store(&self) -> &Arc<DiskCacheStore> {
        &self.inner.store
    }

    /// Make sure `key` is committed to the store, downloading `filename`
    /// from the origin at most once across all concurrent callers.
    pub async fn ensure_cached(
        &self,
        key: &CacheKey,
        filename: &str,
    ) -> Result<CacheEntry, DownloadError> {
        let receiver = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(key) {
                Some(sender) => {
                    tracing::debug!(key = %key, filename = %filename, "Joining in-flight download");
                    self.inner.metrics.record_coalesced_waiter();
                    sender.subscribe()
                }
                None => {
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(key.clone(), sender);
                    self.spawn_download(key.clone(), filename.to_string());
                    receiver
                }
            }
        };

        wait_for_outcome(receiver).await
    }

    /// Number of downloads currently running
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    fn spawn_download(&self, key: CacheKey, filename: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let guard = InFlightGuard {
                inner: Arc::clone(&inner),
                key: key.clone(),
                armed: true,
            };
            let outcome = download(&inner, &key, &filename).await;
            guard.publish(outcome);
        });
    }
}

async fn wait_for_outcome(
    mut receiver: watch::Receiver<Outcome>,
) -> Result<CacheEntry, DownloadError> {
    match receiver.wait_for(Option::is_some).await {
        Ok(outcome) => match &*outcome {
            Some(result) => result.clone(),
            None => Err(DownloadError::Aborted),
        },
        // Sender dropped without publishing: the task died
        Err(_) => Err(DownloadError::Aborted),
    }
}

async fn download(
    inner: &Inner,
    key: &CacheKey,
    filename: &str,
) -> Result<CacheEntry, DownloadError> {
    // A previous download may have committed between the caller's lookup
    // and this task starting
    if let Ok(entry) = inner.store.entry(key).await {
        return Ok(entry);
    }

    let started = Instant::now();
    let object = inner.fetcher.fetch(filename).await?;
    let object_name = object.object_name.clone();

    let entry = inner
        .store
        .put(key, object.body, object.content_type.as_deref())
        .await
        .map_err(|err| match err {
            CacheStoreError::SourceInterrupted(source) => {
                DownloadError::Origin(OriginError::network(&object_name, source.to_string()))
            }
            other => DownloadError::Write(other.to_string()),
        })?;

    tracing::info!(
        key = %key,
        filename = %filename,
        object = %object_name,
        size_bytes = entry.size_bytes,
        duration_ms = started.elapsed().as_millis() as u64,
        "Cached asset from origin"
    );
    Ok(entry)
}

/// Removes the in-flight entry when the download task finishes, including
/// when it panics. Dropping the sender unpublished wakes waiters with
/// `Aborted`.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: CacheKey,
    armed: bool,
}

impl InFlightGuard {
    fn publish(mut self, outcome: Result<CacheEntry, DownloadError>) {
        self.armed = false;
        match &outcome {
            Ok(_) => self.inner.metrics.record_origin_fetch("success"),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "Download failed");
                self.inner.metrics.record_origin_fetch(err.outcome_label());
            }
        }
        let sender = self.inner.in_flight.lock().remove(&self.key);
        if let Some(sender) = sender {
            // No receivers left is fine: every caller went away
            let _ = sender.send(Some(outcome));
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.armed {
            self.inner.in_flight.lock().remove(&self.key);
        }
    }
}
