//! In-memory origin for testing

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::{Origin, OriginError, OriginErrorKind, OriginObject};

const MOCK_CHUNK: usize = 1024;

/// Origin backed by a HashMap, with scripted failures and a call log
#[derive(Clone, Default)]
pub(crate) struct MockOrigin {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    content_types: Arc<RwLock<HashMap<String, String>>>,
    /// Remaining scripted failures per object name
    failures: Arc<RwLock<HashMap<String, (OriginErrorKind, u32)>>>,
    /// Objects whose body fails halfway through
    broken_bodies: Arc<RwLock<HashSet<String>>>,
    calls: Arc<RwLock<Vec<String>>>,
    delay: Arc<RwLock<Duration>>,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, data: impl Into<Bytes>) {
        self.objects.write().insert(name.to_string(), data.into());
    }

    /// Store an object the origin serves with an explicit Content-Type
    pub fn insert_typed(&self, name: &str, data: impl Into<Bytes>, content_type: &str) {
        self.insert(name, data);
        self.content_types
            .write()
            .insert(name.to_string(), content_type.to_string());
    }

    /// Fail the next `times` requests for `name` with `kind`
    pub fn fail(&self, name: &str, kind: OriginErrorKind, times: u32) {
        self.failures.write().insert(name.to_string(), (kind, times));
    }

    pub fn break_body(&self, name: &str) {
        self.broken_bodies.write().insert(name.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    fn scripted_failure(&self, name: &str) -> Option<OriginErrorKind> {
        let mut failures = self.failures.write();
        let (kind, remaining) = failures.get_mut(name)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(*kind)
    }
}

#[async_trait]
impl Origin for MockOrigin {
    async fn get_object(&self, object_name: &str) -> Result<OriginObject, OriginError> {
        self.calls.write().push(object_name.to_string());

        let delay = *self.delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(kind) = self.scripted_failure(object_name) {
            return Err(OriginError::new(kind, object_name, "scripted failure"));
        }

        let data = match self.objects.read().get(object_name) {
            Some(data) => data.clone(),
            None => return Err(OriginError::not_found(object_name)),
        };

        let broken = self.broken_bodies.read().contains(object_name);
        let mut chunks: Vec<Result<Bytes, std::io::Error>> = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + MOCK_CHUNK).min(data.len());
            chunks.push(Ok(data.slice(offset..end)));
            offset = end;
        }
        if broken {
            let keep = chunks.len() / 2;
            chunks.truncate(keep);
            chunks.push(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset mid-body",
            )));
        }

        Ok(OriginObject {
            object_name: object_name.to_string(),
            content_length: Some(data.len() as u64),
            content_type: self.content_types.read().get(object_name).cloned(),
            body: stream::iter(chunks).boxed(),
        })
    }

    fn host(&self) -> &str {
        "mock.origin"
    }
}
