//! Origin fetcher
//!
//! Turns a logical filename into an open origin stream. One pass walks the
//! candidate names from the configured strategies; a pass that ends on a
//! network failure is repeated according to the retry policy. Every origin
//! attempt is bounded by the configured timeout, and the body stream is
//! guarded by the same value as an idle timeout so a stalled origin cannot
//! hold waiters forever.

use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};

use super::naming::{self, NameStrategy};
use super::{ByteStream, Origin, OriginError, OriginErrorKind, OriginObject};
use crate::retry::RetryPolicy;

pub struct OriginFetcher {
    origin: Arc<dyn Origin>,
    strategies: Vec<Box<dyn NameStrategy>>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl OriginFetcher {
    pub fn new(
        origin: Arc<dyn Origin>,
        strategies: Vec<Box<dyn NameStrategy>>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            origin,
            strategies,
            retry,
            timeout,
        }
    }

    pub fn origin_host(&self) -> &str {
        self.origin.host()
    }

    /// Open the object for `logical_filename`, trying every candidate name.
    ///
    /// Errors are `NotFound` when every candidate was missing, `Forbidden` as
    /// soon as one candidate is refused, and `Network` when any candidate hit
    /// a transient failure on the last pass.
    pub async fn fetch(&self, logical_filename: &str) -> Result<OriginObject, OriginError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(logical_filename).await {
                Ok(object) => return Ok(object),
                Err(err) if self.retry.should_retry(attempt, err.kind) => {
                    attempt += 1;
                    let delay = self.retry.backoff_duration(attempt);
                    tracing::warn!(
                        filename = %logical_filename,
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying origin fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, logical_filename: &str) -> Result<OriginObject, OriginError> {
        let mut network_failure: Option<OriginError> = None;

        for (strategy, object_name) in naming::candidates(&self.strategies, logical_filename) {
            let outcome = tokio::time::timeout(self.timeout, self.origin.get_object(&object_name)).await;
            let result = match outcome {
                Ok(result) => result,
                Err(_) => Err(OriginError::network(
                    &object_name,
                    format!("no response within {}s", self.timeout.as_secs()),
                )),
            };

            match result {
                Ok(mut object) => {
                    if strategy != "as_given" {
                        tracing::info!(
                            filename = %logical_filename,
                            object = %object_name,
                            strategy = strategy,
                            "Resolved origin object through filename fallback"
                        );
                    }
                    object.body = with_idle_timeout(object.body, self.timeout);
                    return Ok(object);
                }
                Err(err) => match err.kind {
                    OriginErrorKind::NotFound => {
                        tracing::debug!(object = %object_name, strategy = strategy, "Origin candidate not found");
                    }
                    OriginErrorKind::Forbidden => {
                        tracing::error!(
                            object = %object_name,
                            error = %err,
                            "Origin refused access; check bucket visibility and credentials"
                        );
                        return Err(err);
                    }
                    OriginErrorKind::Network => {
                        tracing::warn!(object = %object_name, error = %err, "Origin candidate failed");
                        network_failure = Some(err);
                    }
                },
            }
        }

        Err(network_failure.unwrap_or_else(|| OriginError::not_found(logical_filename)))
    }
}

/// Fail the stream if no chunk arrives within `idle`
fn with_idle_timeout(body: ByteStream, idle: Duration) -> ByteStream {
    stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "origin body stalled",
                )),
                None,
            )),
        }
    })
    .boxed()
}
