//! Special endpoint handlers for the proxy.
//!
//! This module provides response generators for built-in endpoints:
//! - `/health` - Health check with cache usage
//! - `/metrics` - Prometheus metrics export
//!
//! Functions return `EndpointResponse` instead of writing directly to the
//! session, which keeps response generation testable without Pingora.

use std::time::Instant;

use bytes::Bytes;

use super::response::{ProxyResponse, ResponseBody};
use crate::cache::DiskCacheStore;
use crate::metrics::Metrics;

/// Response from a special endpoint handler.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl EndpointResponse {
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    /// Plain text response in the Prometheus exposition format.
    pub fn prometheus(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; version=0.0.4",
            body,
        }
    }
}

impl From<EndpointResponse> for ProxyResponse {
    fn from(endpoint: EndpointResponse) -> Self {
        let mut response = ProxyResponse::new(endpoint.status)
            .with_header("Content-Type", endpoint.content_type)
            .with_header("Content-Length", endpoint.body.len().to_string())
            .with_header("Cache-Control", "no-store");
        response.body = ResponseBody::Bytes(Bytes::from(endpoint.body));
        response
    }
}

/// Generate response for /health endpoint.
///
/// Reports uptime, version and cache usage. An unreadable cache directory
/// makes the instance unhealthy (503).
pub async fn handle_health(
    start_time: Instant,
    store: &DiskCacheStore,
    in_flight_downloads: usize,
) -> EndpointResponse {
    let uptime_seconds = start_time.elapsed().as_secs();
    let version = env!("CARGO_PKG_VERSION");

    match store.stats().await {
        Ok(stats) => EndpointResponse::json(
            200,
            serde_json::json!({
                "status": "healthy",
                "uptime_seconds": uptime_seconds,
                "version": version,
                "cache": {
                    "entries": stats.entries,
                    "bytes": stats.bytes,
                    "max_bytes": stats.max_bytes,
                    "in_flight_downloads": in_flight_downloads,
                }
            })
            .to_string(),
        ),
        Err(e) => {
            tracing::error!(error = %e, cache_dir = %store.root().display(), "Cache directory unreadable");
            EndpointResponse::json(
                503,
                serde_json::json!({
                    "status": "unhealthy",
                    "uptime_seconds": uptime_seconds,
                    "version": version,
                    "error": e.to_string(),
                })
                .to_string(),
            )
        }
    }
}

/// Generate response for /metrics endpoint.
pub fn handle_metrics(metrics: &Metrics, store: &DiskCacheStore) -> EndpointResponse {
    metrics.set_cache_usage(store.used_bytes(), store.max_size_bytes());
    EndpointResponse::prometheus(metrics.export())
}

/// Fallback for unknown paths.
pub fn handle_not_found(path: &str) -> EndpointResponse {
    EndpointResponse::json(
        404,
        serde_json::json!({
            "error": "Not Found",
            "message": format!("No route for {}", path),
            "status": 404
        })
        .to_string(),
    )
}
