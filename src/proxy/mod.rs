// Proxy module - Pingora ProxyHttp implementation
//
// Every request is answered inside `request_filter`: asset routes are served
// from the local disk cache (populated from the origin on a miss), so the
// proxy never forwards a request to an upstream peer.

use async_trait::async_trait;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::cache::{CacheStoreError, DiskCacheStore};
use crate::config::{Config, OriginConfig};
use crate::metrics::Metrics;
use crate::origin::{default_strategies, Origin, OriginFetcher, SupabaseOrigin};

pub mod cache_status;
pub mod context;
pub mod handler;
pub mod helpers;
pub mod response;
pub mod special_endpoints;

pub use context::RequestContext;
pub use handler::{AssetHandler, AssetKind};
pub use response::{ProxyResponse, ResponseBody};

#[derive(Debug, Error)]
pub enum ProxyInitError {
    #[error("failed to open cache store: {0}")]
    Store(#[from] CacheStoreError),
    #[error("failed to build origin client: {0}")]
    OriginClient(#[from] reqwest::Error),
    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// ReelcacheProxy implements the Pingora ProxyHttp trait
pub struct ReelcacheProxy {
    video: AssetHandler,
    image: AssetHandler,
    store: Arc<DiskCacheStore>,
    metrics: Arc<Metrics>,
    /// Proxy start time (for uptime calculation in /health endpoint)
    start_time: Instant,
}

impl ReelcacheProxy {
    /// Build the proxy from configuration: opens the cache directory and
    /// creates one Supabase client per bucket.
    pub async fn from_config(config: &Config) -> std::result::Result<Self, ProxyInitError> {
        let store = Arc::new(DiskCacheStore::from_config(&config.cache).await?);
        let video_origin: Arc<dyn Origin> =
            Arc::new(SupabaseOrigin::new(&config.origin, &config.origin.video_bucket)?);
        let image_origin: Arc<dyn Origin> =
            Arc::new(SupabaseOrigin::new(&config.origin, &config.origin.image_bucket)?);
        let metrics = Arc::new(Metrics::new()?);

        Ok(Self::new(
            store,
            video_origin,
            image_origin,
            &config.origin,
            config.cache.cache_control_max_age_seconds,
            metrics,
        ))
    }

    /// Assemble the proxy from already-built parts
    pub fn new(
        store: Arc<DiskCacheStore>,
        video_origin: Arc<dyn Origin>,
        image_origin: Arc<dyn Origin>,
        origin_config: &OriginConfig,
        cache_control_max_age: u64,
        metrics: Arc<Metrics>,
    ) -> Self {
        let fetcher = |origin: Arc<dyn Origin>| {
            Arc::new(OriginFetcher::new(
                origin,
                default_strategies(&origin_config.space_substitution_prefixes),
                origin_config.retry.to_retry_policy(),
                Duration::from_secs(origin_config.timeout_seconds),
            ))
        };

        let video = AssetHandler::new(
            AssetKind::Video,
            &origin_config.video_bucket,
            Arc::clone(&store),
            fetcher(video_origin),
            Arc::clone(&metrics),
            cache_control_max_age,
        );
        let image = AssetHandler::new(
            AssetKind::Image,
            &origin_config.image_bucket,
            Arc::clone(&store),
            fetcher(image_origin),
            Arc::clone(&metrics),
            cache_control_max_age,
        );

        Self {
            video,
            image,
            store,
            metrics,
            start_time: Instant::now(),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn store(&self) -> &Arc<DiskCacheStore> {
        &self.store
    }

    pub fn handler(&self, kind: AssetKind) -> &AssetHandler {
        match kind {
            AssetKind::Video => &self.video,
            AssetKind::Image => &self.image,
        }
    }

    /// Route one request to its handler. Returns the route label used for
    /// metrics and the response to write.
    pub async fn route(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        range_header: Option<&str>,
    ) -> (&'static str, ProxyResponse) {
        if let Some(kind) = AssetKind::from_path(path) {
            let is_head = method.eq_ignore_ascii_case("HEAD");
            if !is_head && !method.eq_ignore_ascii_case("GET") {
                let response = self
                    .handler(kind)
                    .reject(405, "method not allowed")
                    .with_header("Allow", "GET, HEAD");
                return (kind.as_str(), response);
            }

            let params = helpers::parse_query(query);
            let filename = params.get("filename").map(String::as_str);
            let response = self.handler(kind).handle(filename, range_header).await;
            let response = if is_head {
                response.without_body()
            } else {
                response
            };
            return (kind.as_str(), response);
        }

        match path {
            "/health" => {
                let in_flight = self.video.coordinator().in_flight_count()
                    + self.image.coordinator().in_flight_count();
                let endpoint =
                    special_endpoints::handle_health(self.start_time, &self.store, in_flight).await;
                ("health", endpoint.into())
            }
            "/metrics" => (
                "metrics",
                special_endpoints::handle_metrics(&self.metrics, &self.store).into(),
            ),
            _ => ("unknown", special_endpoints::handle_not_found(path).into()),
        }
    }

    /// Write status, headers and body to the session, streaming the body in
    /// chunks. A failed write (client gone) stops reading and drops the body's
    /// file handle or origin stream.
    async fn write_response(
        &self,
        session: &mut Session,
        ctx: &mut RequestContext,
        response: ProxyResponse,
    ) -> Result<()> {
        let ProxyResponse {
            status,
            headers,
            mut body,
        } = response;

        let mut header = ResponseHeader::build(status, Some(headers.len() + 1))?;
        for (name, value) in headers {
            header.insert_header(name, value)?;
        }
        header.insert_header("X-Request-ID", ctx.request_id())?;

        let empty = body.is_empty();
        session
            .write_response_header(Box::new(header), empty)
            .await?;
        if empty {
            return Ok(());
        }

        loop {
            match body.next_chunk().await {
                Ok(Some(chunk)) => {
                    let len = chunk.len() as u64;
                    session.write_response_body(Some(chunk), false).await?;
                    ctx.add_bytes_sent(len);
                    self.metrics.add_bytes_served(len);
                }
                Ok(None) => {
                    session.write_response_body(None, true).await?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        bytes_sent = ctx.bytes_sent(),
                        error = %e,
                        "Response body failed mid-stream"
                    );
                    return Err(pingora_core::Error::explain(
                        pingora_core::ErrorType::WriteError,
                        "response body failed mid-stream",
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl ProxyHttp for ReelcacheProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    /// Never reached: `request_filter` answers every request
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        tracing::error!(request_id = %ctx.request_id(), "Request reached upstream_peer");
        Err(pingora_core::Error::explain(
            pingora_core::ErrorType::InternalError,
            "reelcache has no upstream peers",
        ))
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let req = session.req_header();
        let method = req.method.as_str().to_string();
        let path = req.uri.path().to_string();
        let query = req.uri.query().map(str::to_string);
        let range = req
            .headers
            .get(http::header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (route, response) = self
            .route(&method, &path, query.as_deref(), range.as_deref())
            .await;

        ctx.set_route(route);
        ctx.set_status(response.status);
        self.metrics
            .record_request(route, response.status, ctx.started().elapsed());

        self.write_response(session, ctx, response).await?;
        Ok(true)
    }

    /// Access log line per request
    async fn logging(
        &self,
        session: &mut Session,
        e: Option<&pingora_core::Error>,
        ctx: &mut Self::CTX,
    ) {
        let client_ip = helpers::get_client_ip(session);
        let req = session.req_header();
        let duration_ms = ctx.started().elapsed().as_millis() as u64;

        if let Some(error) = e {
            tracing::warn!(
                request_id = %ctx.request_id(),
                client_ip = %client_ip,
                method = %req.method,
                path = %req.uri.path(),
                status_code = ctx.status(),
                bytes_sent = ctx.bytes_sent(),
                duration_ms = duration_ms,
                error = %error,
                "Request ended with error"
            );
            return;
        }

        tracing::info!(
            request_id = %ctx.request_id(),
            client_ip = %client_ip,
            method = %req.method,
            path = %req.uri.path(),
            route = ctx.route(),
            status_code = ctx.status(),
            bytes_sent = ctx.bytes_sent(),
            duration_ms = duration_ms,
            "Request completed"
        );
    }
}
