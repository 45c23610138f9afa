//! Supabase Storage origin
//!
//! Public objects are served at
//! `{base_url}/storage/v1/object/public/{bucket}/{object}`. Status codes are
//! classified here so the fetcher only deals with `OriginErrorKind`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;

use super::naming::has_dot_segment;
use super::{Origin, OriginError, OriginObject};
use crate::config::OriginConfig;

/// Connect timeout for the origin client; the whole-attempt bound is applied
/// by the fetcher
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SupabaseOrigin {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    host: String,
}

impl SupabaseOrigin {
    pub fn new(config: &OriginConfig, bucket: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("reelcache/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            host: config.host(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public URL for an object. Each path segment is percent-encoded so
    /// spaces and reserved characters survive the trip.
    ///
    /// Names with `.` or `..` segments cannot name an object inside the
    /// bucket and are reported as not found.
    pub fn object_url(&self, object_name: &str) -> Result<String, OriginError> {
        if has_dot_segment(object_name) {
            return Err(OriginError::not_found(object_name));
        }
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_object_path(object_name)
        ))
    }
}

fn encode_object_path(object_name: &str) -> String {
    object_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a non-success origin status to an error.
///
/// Supabase answers 400 for missing public objects on some deployments, so
/// it is treated like 404.
pub fn classify_status(status: StatusCode, object_name: &str) -> OriginError {
    match status.as_u16() {
        400 | 404 => OriginError::not_found(object_name),
        401 | 403 => OriginError::forbidden(object_name, format!("origin returned {}", status)),
        _ => OriginError::network(object_name, format!("origin returned {}", status)),
    }
}

#[async_trait]
impl Origin for SupabaseOrigin {
    async fn get_object(&self, object_name: &str) -> Result<OriginObject, OriginError> {
        let url = self.object_url(object_name)?;
        tracing::debug!(url = %url, "Origin GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OriginError::network(object_name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, object_name));
        }

        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed();

        Ok(OriginObject {
            object_name: object_name.to_string(),
            content_length,
            content_type,
            body,
        })
    }

    fn host(&self) -> &str {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::OriginErrorKind;

    fn origin() -> SupabaseOrigin {
        SupabaseOrigin::new(&OriginConfig::new("https://abcd.supabase.co/"), "videos").unwrap()
    }

    fn url(name: &str) -> String {
        origin().object_url(name).unwrap()
    }

    #[test]
    fn test_object_url_plain_name() {
        assert_eq!(
            url("demo.mp4"),
            "https://abcd.supabase.co/storage/v1/object/public/videos/demo.mp4"
        );
    }

    #[test]
    fn test_object_url_encodes_spaces() {
        assert_eq!(
            url("gallery Our vitamin sea.mp4"),
            "https://abcd.supabase.co/storage/v1/object/public/videos/gallery%20Our%20vitamin%20sea.mp4"
        );
    }

    #[test]
    fn test_object_url_keeps_path_separators() {
        assert_eq!(
            url("2024/clip #1.mp4"),
            "https://abcd.supabase.co/storage/v1/object/public/videos/2024/clip%20%231.mp4"
        );
    }

    #[test]
    fn test_object_url_rejects_dot_segments() {
        for name in ["../x", "../../authenticated/private-bucket/secret.mp4", "a/./b.mp4", ".."] {
            let err = origin().object_url(name).unwrap_err();
            assert_eq!(err.kind, OriginErrorKind::NotFound, "{}", name);
        }
    }

    #[test]
    fn test_encoded_dots_stay_inside_bucket() {
        let url = url("%2e%2e/%2E%2E/x.mp4");
        assert_eq!(
            url,
            "https://abcd.supabase.co/storage/v1/object/public/videos/%252e%252e/%252E%252E/x.mp4"
        );
        let parsed = reqwest::Url::parse(&url).unwrap();
        assert!(parsed.path().starts_with("/storage/v1/object/public/videos/"));
    }

    #[test]
    fn test_host_comes_from_base_url() {
        assert_eq!(origin().host(), "abcd.supabase.co");
    }

    #[test]
    fn test_status_classification() {
        let kind = |code: u16| classify_status(StatusCode::from_u16(code).unwrap(), "x").kind;
        assert_eq!(kind(404), OriginErrorKind::NotFound);
        assert_eq!(kind(400), OriginErrorKind::NotFound);
        assert_eq!(kind(401), OriginErrorKind::Forbidden);
        assert_eq!(kind(403), OriginErrorKind::Forbidden);
        assert_eq!(kind(500), OriginErrorKind::Network);
        assert_eq!(kind(503), OriginErrorKind::Network);
        assert_eq!(kind(429), OriginErrorKind::Network);
    }
}
