//! Diagnostic cache-status headers.
//!
//! Pure header stamping consumed by the frontend's diagnostic badge. Nothing
//! here influences whether a request succeeds.

use super::response::ProxyResponse;

pub const X_CACHE_STATUS: &str = "X-Cache-Status";
pub const X_DATA_SOURCE: &str = "X-Data-Source";
pub const X_ORIGIN: &str = "X-Origin";
pub const X_CONTENT_BYTES: &str = "X-Content-Bytes";

/// Where the response body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Committed cache file that existed before the request
    LocalCache,
    /// Cache file populated from origin by this (or a coalesced) request
    Origin,
    /// Origin stream passed straight through without caching
    OriginDirect,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::LocalCache => "local-cache",
            DataSource::Origin => "origin",
            DataSource::OriginDirect => "origin-direct",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStatus<'a> {
    pub hit: bool,
    pub source: DataSource,
    pub origin: &'a str,
    /// Body bytes of this response
    pub bytes: u64,
}

pub fn annotate(response: &mut ProxyResponse, status: &CacheStatus<'_>) {
    response.set_header(X_CACHE_STATUS, if status.hit { "HIT" } else { "MISS" });
    response.set_header(X_DATA_SOURCE, status.source.as_str());
    response.set_header(X_ORIGIN, status.origin);
    response.set_header(X_CONTENT_BYTES, status.bytes.to_string());
}
