//! Range-serving asset handler.
//!
//! One handler per asset route. It resolves the logical filename to a cache
//! key, populates the cache through the download coordinator on a miss and
//! streams the requested byte range from the committed file. This is the
//! only place where internal failure kinds become HTTP status codes.

use std::io::SeekFrom;
use std::str::FromStr;
use std::sync::Arc;

use tokio::io::AsyncSeekExt;

use super::cache_status::{annotate, CacheStatus, DataSource};
use super::response::{ProxyResponse, ResponseBody};
use crate::cache::{content_type_for, CacheKey, ContentAddressResolver, DiskCacheStore, OpenedEntry};
use crate::metrics::Metrics;
use crate::origin::{OriginErrorKind, OriginFetcher};
use crate::range::{parse_range, unsatisfiable_content_range};
use crate::request_coalescing::{DownloadCoordinator, DownloadError};

/// Asset family served by one proxy route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Video,
    Image,
}

impl AssetKind {
    pub fn route(&self) -> &'static str {
        match self {
            AssetKind::Video => "/api/video-proxy",
            AssetKind::Image => "/api/image-proxy",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Video => "video",
            AssetKind::Image => "image",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/api/video-proxy" => Some(AssetKind::Video),
            "/api/image-proxy" => Some(AssetKind::Image),
            _ => None,
        }
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(AssetKind::Video),
            "image" => Ok(AssetKind::Image),
            other => Err(format!("unknown asset kind '{}' (expected video or image)", other)),
        }
    }
}

pub struct AssetHandler {
    kind: AssetKind,
    resolver: ContentAddressResolver,
    store: Arc<DiskCacheStore>,
    coordinator: DownloadCoordinator,
    metrics: Arc<Metrics>,
    cache_control: String,
}

impl AssetHandler {
    /// `namespace` scopes cache keys (the origin bucket name)
    pub fn new(
        kind: AssetKind,
        namespace: &str,
        store: Arc<DiskCacheStore>,
        fetcher: Arc<OriginFetcher>,
        metrics: Arc<Metrics>,
        cache_control_max_age: u64,
    ) -> Self {
        let coordinator =
            DownloadCoordinator::new(Arc::clone(&store), fetcher, Arc::clone(&metrics));
        Self {
            kind,
            resolver: ContentAddressResolver::new(namespace),
            store,
            coordinator,
            metrics,
            cache_control: format!("public, max-age={}", cache_control_max_age),
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn resolver(&self) -> &ContentAddressResolver {
        &self.resolver
    }

    pub fn coordinator(&self) -> &DownloadCoordinator {
        &self.coordinator
    }

    fn origin_host(&self) -> &str {
        self.coordinator.fetcher().origin_host()
    }

    /// Serve `filename`, honoring an optional `Range` header
    pub async fn handle(&self, filename: Option<&str>, range_header: Option<&str>) -> ProxyResponse {
        let filename = match filename.map(str::trim).filter(|f| !f.is_empty()) {
            Some(f) => f,
            None => return self.reject(400, "missing 'filename' query parameter"),
        };

        let key = self.resolver.resolve(filename);
        let hit = self.store.has(&key).await;
        self.metrics.record_cache_lookup(hit);

        if hit {
            tracing::debug!(kind = self.kind.as_str(), filename = %filename, key = %key, "Cache hit");
        } else {
            match self.coordinator.ensure_cached(&key, filename).await {
                Ok(_) => {}
                // A write failure reaches every coalesced waiter, but the
                // degraded stream below is per request: while the cache is
                // full, each request for the asset costs one origin download.
                Err(err) if err.is_write_failure() => {
                    tracing::warn!(
                        filename = %filename,
                        key = %key,
                        error = %err,
                        "Cache write failed; streaming directly from origin"
                    );
                    return self.serve_from_origin(&key, filename, range_header).await;
                }
                Err(err) => return self.failure_response(filename, &err),
            }
        }

        let opened = match self.store.open(&key).await {
            Ok(opened) => opened,
            Err(err) => {
                // Purged or unreadable between population and open
                tracing::warn!(
                    filename = %filename,
                    key = %key,
                    error = %err,
                    "Cached entry unavailable; streaming directly from origin"
                );
                return self.serve_from_origin(&key, filename, range_header).await;
            }
        };

        let source = if hit {
            DataSource::LocalCache
        } else {
            DataSource::Origin
        };
        match self.file_response(opened, range_header, hit, source).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(filename = %filename, key = %key, error = %err, "Failed to seek cached file");
                self.serve_from_origin(&key, filename, range_header).await
            }
        }
    }

    async fn file_response(
        &self,
        opened: OpenedEntry,
        range_header: Option<&str>,
        hit: bool,
        source: DataSource,
    ) -> std::io::Result<ProxyResponse> {
        let OpenedEntry { entry, mut file } = opened;
        let total = entry.size_bytes;

        let mut response = match range_header {
            None => {
                let mut response = self.asset_response(200, &entry.content_type, total);
                response.body = ResponseBody::File {
                    file,
                    remaining: total,
                };
                response
            }
            Some(header) => match parse_range(header, total) {
                Ok(range) => {
                    file.seek(SeekFrom::Start(range.start)).await?;
                    let mut response = self.asset_response(206, &entry.content_type, range.len());
                    response.set_header("Content-Range", range.content_range());
                    response.body = ResponseBody::File {
                        file,
                        remaining: range.len(),
                    };
                    response
                }
                Err(err) => {
                    tracing::debug!(range = %header, total, error = %err, "Rejecting range");
                    self.unsatisfiable_response(total)
                }
            },
        };

        let bytes = body_len(&response);
        annotate(
            &mut response,
            &CacheStatus {
                hit,
                source,
                origin: self.origin_host(),
                bytes,
            },
        );
        Ok(response)
    }

    /// Degraded mode: pass the origin stream through without caching
    async fn serve_from_origin(
        &self,
        key: &CacheKey,
        filename: &str,
        range_header: Option<&str>,
    ) -> ProxyResponse {
        self.metrics.record_degraded_response();

        let object = match self.coordinator.fetcher().fetch(filename).await {
            Ok(object) => object,
            Err(err) => return self.failure_response(filename, &DownloadError::Origin(err)),
        };
        let content_type = object
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(key));

        let mut response = match (range_header, object.content_length) {
            (Some(header), Some(total)) => match parse_range(header, total) {
                Ok(range) => {
                    let mut response = self.asset_response(206, &content_type, range.len());
                    response.set_header("Content-Range", range.content_range());
                    response.body = ResponseBody::Stream {
                        stream: object.body,
                        skip: range.start,
                        remaining: Some(range.len()),
                    };
                    response
                }
                Err(_) => self.unsatisfiable_response(total),
            },
            (_, content_length) => {
                let mut response = ProxyResponse::new(200);
                response.set_header("Content-Type", content_type);
                response.set_header("Cache-Control", self.cache_control.clone());
                if let Some(length) = content_length {
                    response.set_header("Content-Length", length.to_string());
                }
                response.body = ResponseBody::Stream {
                    stream: object.body,
                    skip: 0,
                    remaining: content_length,
                };
                response
            }
        };

        let bytes = body_len(&response);
        annotate(
            &mut response,
            &CacheStatus {
                hit: false,
                source: DataSource::OriginDirect,
                origin: self.origin_host(),
                bytes,
            },
        );
        response
    }

    fn asset_response(&self, status: u16, content_type: &str, length: u64) -> ProxyResponse {
        ProxyResponse::new(status)
            .with_header("Content-Type", content_type)
            .with_header("Content-Length", length.to_string())
            .with_header("Accept-Ranges", "bytes")
            .with_header("Cache-Control", self.cache_control.clone())
    }

    fn unsatisfiable_response(&self, total: u64) -> ProxyResponse {
        ProxyResponse::new(416)
            .with_header("Content-Range", unsatisfiable_content_range(total))
            .with_header("Content-Length", "0")
            .with_header("Accept-Ranges", "bytes")
    }

    /// Error response for a request refused before any cache lookup
    pub fn reject(&self, status: u16, message: &str) -> ProxyResponse {
        let mut response = ProxyResponse::error(status, message);
        self.annotate_miss(&mut response);
        response
    }

    fn annotate_miss(&self, response: &mut ProxyResponse) {
        let bytes = body_len(response);
        annotate(
            response,
            &CacheStatus {
                hit: false,
                source: DataSource::Origin,
                origin: self.origin_host(),
                bytes,
            },
        );
    }

    fn failure_response(&self, filename: &str, err: &DownloadError) -> ProxyResponse {
        let mut response = match err {
            DownloadError::Origin(origin_err) => match origin_err.kind {
                OriginErrorKind::NotFound => {
                    tracing::info!(kind = self.kind.as_str(), filename = %filename, "Asset not found at origin");
                    ProxyResponse::error(404, "asset not found")
                }
                OriginErrorKind::Forbidden => {
                    tracing::error!(
                        kind = self.kind.as_str(),
                        filename = %filename,
                        error = %origin_err,
                        "Origin denied access to asset; bucket policy or credentials are misconfigured"
                    );
                    ProxyResponse::error(404, "asset not found")
                }
                OriginErrorKind::Network => {
                    tracing::warn!(kind = self.kind.as_str(), filename = %filename, error = %origin_err, "Origin unavailable");
                    ProxyResponse::error(502, "origin unavailable")
                }
            },
            DownloadError::Aborted | DownloadError::Write(_) => {
                tracing::warn!(kind = self.kind.as_str(), filename = %filename, error = %err, "Download did not complete");
                ProxyResponse::error(502, "origin download failed")
            }
        };
        self.annotate_miss(&mut response);
        response
    }
}

fn body_len(response: &ProxyResponse) -> u64 {
    response
        .header("Content-Length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::mock::MockOrigin;
    use crate::origin::default_strategies;
    use crate::retry::RetryPolicy;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn handler(dir: &TempDir, origin: &MockOrigin, max: u64) -> AssetHandler {
        let store = Arc::new(DiskCacheStore::new(dir.path(), max).await.unwrap());
        let fetcher = Arc::new(OriginFetcher::new(
            Arc::new(origin.clone()),
            default_strategies(&["gallery_".to_string()]),
            RetryPolicy::no_retry(),
            Duration::from_secs(5),
        ));
        AssetHandler::new(
            AssetKind::Video,
            "videos",
            store,
            fetcher,
            Arc::new(Metrics::new().unwrap()),
            3600,
        )
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        origin.insert("demo.mp4", patterned(1000));
        let handler = handler(&dir, &origin, u64::MAX).await;

        let mut first = handler.handle(Some("demo.mp4"), None).await;
        assert_eq!(first.status, 200);
        assert_eq!(first.header("X-Cache-Status"), Some("MISS"));
        assert_eq!(first.header("X-Data-Source"), Some("origin"));
        assert_eq!(first.header("Content-Type"), Some("video/mp4"));
        assert_eq!(first.header("Cache-Control"), Some("public, max-age=3600"));
        assert_eq!(first.collect_body().await.unwrap(), patterned(1000));

        let second = handler.handle(Some("demo.mp4"), None).await;
        assert_eq!(second.header("X-Cache-Status"), Some("HIT"));
        assert_eq!(second.header("X-Data-Source"), Some("local-cache"));
        assert_eq!(second.header("X-Origin"), Some("mock.origin"));
        assert_eq!(origin.call_count(), 1);
    }

    #[tokio::test]
    async fn test_origin_content_type_is_kept_for_hits() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        origin.insert_typed("trailer", patterned(100), "video/quicktime");
        let handler = handler(&dir, &origin, u64::MAX).await;

        let miss = handler.handle(Some("trailer"), None).await;
        assert_eq!(miss.header("X-Cache-Status"), Some("MISS"));
        assert_eq!(miss.header("Content-Type"), Some("video/quicktime"));

        let hit = handler.handle(Some("trailer"), Some("bytes=0-9")).await;
        assert_eq!(hit.header("X-Cache-Status"), Some("HIT"));
        assert_eq!(hit.header("Content-Type"), Some("video/quicktime"));
    }

    #[tokio::test]
    async fn test_range_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        let data = patterned(1000);
        origin.insert("demo.mp4", data.clone());
        let handler = handler(&dir, &origin, u64::MAX).await;

        let mut response = handler.handle(Some("demo.mp4"), Some("bytes=100-199")).await;
        assert_eq!(response.status, 206);
        assert_eq!(response.header("Content-Range"), Some("bytes 100-199/1000"));
        assert_eq!(response.header("Content-Length"), Some("100"));
        assert_eq!(response.header("X-Content-Bytes"), Some("100"));
        assert_eq!(response.collect_body().await.unwrap(), &data[100..200]);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        origin.insert("demo.mp4", patterned(1000));
        let handler = handler(&dir, &origin, u64::MAX).await;

        let response = handler.handle(Some("demo.mp4"), Some("bytes=2000-")).await;
        assert_eq!(response.status, 416);
        assert_eq!(response.header("Content-Range"), Some("bytes */1000"));

        let malformed = handler.handle(Some("demo.mp4"), Some("bytes=oops")).await;
        assert_eq!(malformed.status, 416);
    }

    #[tokio::test]
    async fn test_missing_filename_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        let handler = handler(&dir, &origin, u64::MAX).await;

        let missing = handler.handle(None, None).await;
        assert_eq!(missing.status, 400);
        assert_eq!(missing.header("X-Cache-Status"), Some("MISS"));
        assert_eq!(missing.header("X-Data-Source"), Some("origin"));
        assert_eq!(missing.header("X-Origin"), Some("mock.origin"));
        assert_eq!(
            missing.header("X-Content-Bytes"),
            missing.header("Content-Length")
        );
        assert_eq!(handler.handle(Some("  "), None).await.status, 400);
        assert_eq!(origin.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_classification() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        origin.fail("private.mp4", OriginErrorKind::Forbidden, u32::MAX);
        origin.fail("flaky.mp4", OriginErrorKind::Network, u32::MAX);
        let handler = handler(&dir, &origin, u64::MAX).await;

        assert_eq!(handler.handle(Some("missing.mp4"), None).await.status, 404);
        assert_eq!(handler.handle(Some("private.mp4"), None).await.status, 404);
        let flaky = handler.handle(Some("flaky.mp4"), None).await;
        assert_eq!(flaky.status, 502);
        assert_eq!(flaky.header("X-Cache-Status"), Some("MISS"));
    }

    #[tokio::test]
    async fn test_storage_full_degrades_to_direct_stream() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        let data = patterned(4096);
        origin.insert("big.mp4", data.clone());
        let handler = handler(&dir, &origin, 1024).await;

        let mut full = handler.handle(Some("big.mp4"), None).await;
        assert_eq!(full.status, 200);
        assert_eq!(full.header("X-Data-Source"), Some("origin-direct"));
        assert_eq!(full.header("Content-Length"), Some("4096"));
        assert_eq!(full.collect_body().await.unwrap(), data);

        let mut ranged = handler.handle(Some("big.mp4"), Some("bytes=1000-2999")).await;
        assert_eq!(ranged.status, 206);
        assert_eq!(ranged.header("Content-Range"), Some("bytes 1000-2999/4096"));
        assert_eq!(ranged.collect_body().await.unwrap(), &data[1000..3000]);

        assert!(!handler.store.has(&handler.resolver().resolve("big.mp4")).await);
    }

    #[tokio::test]
    async fn test_coalesced_waiters_each_stream_from_origin_when_cache_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let origin = MockOrigin::new();
        let data = patterned(4096);
        origin.insert("popular.mp4", data.clone());
        origin.set_delay(Duration::from_millis(50));
        let handler = handler(&dir, &origin, 1024).await;

        let responses =
            futures::future::join_all((0..5).map(|_| handler.handle(Some("popular.mp4"), None))).await;

        for mut response in responses {
            assert_eq!(response.status, 200);
            assert_eq!(response.header("X-Data-Source"), Some("origin-direct"));
            assert_eq!(response.collect_body().await.unwrap(), data);
        }
        // One shared download attempt, then one direct stream per request
        assert_eq!(origin.call_count(), 1 + 5);
        assert_eq!(handler.coordinator().in_flight_count(), 0);
    }

    #[test]
    fn test_asset_kind_parsing() {
        assert_eq!(AssetKind::from_path("/api/video-proxy"), Some(AssetKind::Video));
        assert_eq!(AssetKind::from_path("/api/image-proxy/"), Some(AssetKind::Image));
        assert_eq!(AssetKind::from_path("/api/other"), None);
        assert_eq!("IMAGE".parse::<AssetKind>(), Ok(AssetKind::Image));
        assert!("audio".parse::<AssetKind>().is_err());
    }
}
