// Metrics module - Prometheus metrics for the caching proxy
//
// Each `Metrics` owns its own `Registry`, so several proxy instances (and
// tests) can coexist in one process without colliding on metric names.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,

    /// Requests by route and response status
    requests: IntCounterVec,
    request_duration: HistogramVec,

    /// Local cache lookups by result (hit, miss)
    cache_lookups: IntCounterVec,

    /// Origin downloads by outcome (success, not_found, forbidden, network,
    /// write_failed, aborted)
    origin_fetches: IntCounterVec,

    /// Requests that attached to an already running download
    coalesced_waiters: IntCounter,

    bytes_served: IntCounter,

    /// Responses streamed straight from origin because the cache write failed
    degraded_responses: IntCounter,

    cache_used_bytes: IntGauge,
    cache_max_bytes: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("reelcache_requests_total", "Total requests by route and status"),
            &["route", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "reelcache_request_duration_seconds",
                "Time to first response byte in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["route"],
        )?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("reelcache_cache_lookups_total", "Local cache lookups by result"),
            &["result"],
        )?;
        let origin_fetches = IntCounterVec::new(
            Opts::new("reelcache_origin_fetches_total", "Origin downloads by outcome"),
            &["outcome"],
        )?;
        let coalesced_waiters = IntCounter::new(
            "reelcache_coalesced_waiters_total",
            "Requests that joined an in-flight download",
        )?;
        let bytes_served = IntCounter::new(
            "reelcache_bytes_served_total",
            "Response body bytes written to clients",
        )?;
        let degraded_responses = IntCounter::new(
            "reelcache_degraded_responses_total",
            "Responses served directly from origin after a cache write failure",
        )?;
        let cache_used_bytes =
            IntGauge::new("reelcache_cache_used_bytes", "Bytes held by the disk cache")?;
        let cache_max_bytes =
            IntGauge::new("reelcache_cache_max_bytes", "Configured disk cache capacity")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(origin_fetches.clone()))?;
        registry.register(Box::new(coalesced_waiters.clone()))?;
        registry.register(Box::new(bytes_served.clone()))?;
        registry.register(Box::new(degraded_responses.clone()))?;
        registry.register(Box::new(cache_used_bytes.clone()))?;
        registry.register(Box::new(cache_max_bytes.clone()))?;

        Ok(Self {
            registry,
            requests,
            request_duration,
            cache_lookups,
            origin_fetches,
            coalesced_waiters,
            bytes_served,
            degraded_responses,
            cache_used_bytes,
            cache_max_bytes,
        })
    }

    pub fn record_request(&self, route: &str, status: u16, duration: Duration) {
        self.requests
            .with_label_values(&[route, &status.to_string()])
            .inc();
        self.request_duration
            .with_label_values(&[route])
            .observe(duration.as_secs_f64());
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    pub fn record_origin_fetch(&self, outcome: &str) {
        self.origin_fetches.with_label_values(&[outcome]).inc();
    }

    pub fn record_coalesced_waiter(&self) {
        self.coalesced_waiters.inc();
    }

    pub fn add_bytes_served(&self, bytes: u64) {
        self.bytes_served.inc_by(bytes);
    }

    pub fn record_degraded_response(&self) {
        self.degraded_responses.inc();
    }

    pub fn set_cache_usage(&self, used_bytes: u64, max_bytes: u64) {
        self.cache_used_bytes.set(clamp_i64(used_bytes));
        self.cache_max_bytes.set(clamp_i64(max_bytes));
    }

    /// Prometheus text exposition of every registered metric
    pub fn export(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
