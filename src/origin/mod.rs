// Origin module
//
// Everything that talks to remote object storage: the `Origin` seam, the
// Supabase Storage client behind it, the filename strategies that bridge
// logical names to stored object names, and the fetcher that walks those
// strategies with retries and timeouts.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

pub mod fetcher;
pub mod naming;
pub mod supabase;

#[cfg(test)]
pub(crate) mod mock;

pub use fetcher::OriginFetcher;
pub use naming::{default_strategies, NameStrategy};
pub use supabase::SupabaseOrigin;

/// Body of an origin response, streamed chunk by chunk
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Classified origin failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginErrorKind {
    /// Object absent at origin; permanent for this request
    NotFound,
    /// Permission or configuration problem; never retried
    Forbidden,
    /// Transient: connection failures, timeouts, 5xx
    Network,
}

impl OriginErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginErrorKind::NotFound => "not_found",
            OriginErrorKind::Forbidden => "forbidden",
            OriginErrorKind::Network => "network",
        }
    }
}

impl std::fmt::Display for OriginErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("origin {kind} for '{object}': {message}")]
pub struct OriginError {
    pub kind: OriginErrorKind,
    /// Object name (or logical filename) the failure refers to
    pub object: String,
    pub message: String,
}

impl OriginError {
    pub fn new(kind: OriginErrorKind, object: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            object: object.into(),
            message: message.into(),
        }
    }

    pub fn not_found(object: impl Into<String>) -> Self {
        Self::new(OriginErrorKind::NotFound, object, "object not found")
    }

    pub fn forbidden(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(OriginErrorKind::Forbidden, object, message)
    }

    pub fn network(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(OriginErrorKind::Network, object, message)
    }
}

/// A successful origin GET
pub struct OriginObject {
    /// Stored object name that answered (may differ from the logical name)
    pub object_name: String,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for OriginObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginObject")
            .field("object_name", &self.object_name)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Remote object storage, addressed by exact stored object name
#[async_trait]
pub trait Origin: Send + Sync {
    /// GET one object. The name is used verbatim (implementations encode it).
    async fn get_object(&self, object_name: &str) -> Result<OriginObject, OriginError>;

    /// Host reported in the `X-Origin` diagnostic header
    fn host(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(OriginErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(OriginErrorKind::Forbidden.as_str(), "forbidden");
        assert_eq!(OriginErrorKind::Network.as_str(), "network");
    }

    #[test]
    fn test_error_display() {
        let err = OriginError::network("demo.mp4", "connection refused");
        assert_eq!(
            err.to_string(),
            "origin network for 'demo.mp4': connection refused"
        );
    }
}
