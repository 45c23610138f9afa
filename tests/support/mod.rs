//! Shared test helpers: an in-memory origin and a proxy wired to it.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use reelcache::cache::DiskCacheStore;
use reelcache::config::OriginConfig;
use reelcache::metrics::Metrics;
use reelcache::origin::{Origin, OriginError, OriginErrorKind, OriginObject};
use reelcache::proxy::{ProxyResponse, ReelcacheProxy};

/// Origin double holding objects in memory and counting GETs
#[derive(Clone, Default)]
pub struct MemoryOrigin {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    failures: Arc<RwLock<HashMap<String, OriginErrorKind>>>,
    requests: Arc<RwLock<Vec<String>>>,
    successful_gets: Arc<AtomicUsize>,
    delay: Arc<RwLock<Duration>>,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, data: Vec<u8>) {
        self.objects.write().insert(name.to_string(), Bytes::from(data));
    }

    pub fn always_fail(&self, name: &str, kind: OriginErrorKind) {
        self.failures.write().insert(name.to_string(), kind);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = delay;
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.read().clone()
    }

    /// GETs that returned a body (i.e. real downloads)
    pub fn downloads(&self) -> usize {
        self.successful_gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for MemoryOrigin {
    async fn get_object(&self, object_name: &str) -> Result<OriginObject, OriginError> {
        self.requests.write().push(object_name.to_string());
        let delay = *self.delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.failures.read().get(object_name) {
            return Err(OriginError::new(*kind, object_name, "simulated"));
        }
        let data = self
            .objects
            .read()
            .get(object_name)
            .cloned()
            .ok_or_else(|| OriginError::not_found(object_name))?;
        self.successful_gets.fetch_add(1, Ordering::SeqCst);

        let chunks: Vec<Result<Bytes, std::io::Error>> = data
            .chunks(16 * 1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(OriginObject {
            object_name: object_name.to_string(),
            content_length: Some(data.len() as u64),
            content_type: None,
            body: stream::iter(chunks).boxed(),
        })
    }

    fn host(&self) -> &str {
        "test.supabase.co"
    }
}

pub struct TestProxy {
    pub proxy: Arc<ReelcacheProxy>,
    pub videos: MemoryOrigin,
    pub images: MemoryOrigin,
    pub dir: TempDir,
}

impl TestProxy {
    pub async fn new() -> Self {
        Self::with_capacity(u64::MAX).await
    }

    pub async fn with_capacity(max_bytes: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DiskCacheStore::new(dir.path(), max_bytes).await.unwrap());
        let videos = MemoryOrigin::new();
        let images = MemoryOrigin::new();

        let mut origin_config = OriginConfig::new("https://test.supabase.co");
        origin_config.retry.max_attempts = 1;

        let proxy = ReelcacheProxy::new(
            store,
            Arc::new(videos.clone()),
            Arc::new(images.clone()),
            &origin_config,
            600,
            Arc::new(Metrics::new().unwrap()),
        );

        Self {
            proxy: Arc::new(proxy),
            videos,
            images,
            dir,
        }
    }

    pub async fn get(&self, path_and_query: &str, range: Option<&str>) -> ProxyResponse {
        self.request("GET", path_and_query, range).await
    }

    pub async fn request(&self, method: &str, path_and_query: &str, range: Option<&str>) -> ProxyResponse {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        self.proxy.route(method, path, query, range).await.1
    }

    /// Committed cache files (temp directory excluded)
    pub fn cached_files(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .count()
    }
}

pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}
